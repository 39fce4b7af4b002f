// =====================================================================================
// STREAM CLIENT DRIVER TESTS
// =====================================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_models::{AlertChanged, Heartbeat, Metric};
use stream_cell::services::FrameStream;
use stream_cell::{
    ClientSnapshot, ConnectionState, ReconnectConfig, SseFrame, SseTransport, StreamCallbacks,
    StreamClient, StreamError, StreamTransport,
};

// =====================================================================================
// FIXTURES
// =====================================================================================

enum Dial {
    Refuse,
    Open(Vec<SseFrame>),
}

/// Plays back a fixed sequence of dial outcomes, refusing once exhausted.
/// Opened streams stay open after their frames.
struct ScriptedTransport {
    script: Mutex<VecDeque<Dial>>,
    dials: Arc<AtomicUsize>,
    dialed: mpsc::UnboundedSender<usize>,
}

impl ScriptedTransport {
    fn new(script: Vec<Dial>) -> (Self, Arc<AtomicUsize>, mpsc::UnboundedReceiver<usize>) {
        let dials = Arc::new(AtomicUsize::new(0));
        let (dialed, dialed_rx) = mpsc::unbounded_channel();
        let transport = Self {
            script: Mutex::new(script.into()),
            dials: dials.clone(),
            dialed,
        };
        (transport, dials, dialed_rx)
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn connect(&self) -> Result<FrameStream, StreamError> {
        let n = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.dialed.send(n);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Dial::Open(frames)) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(Dial::Refuse) | None => Err(StreamError::Connect("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, entry: String) {
        self.seen.lock().unwrap().push(entry);
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl StreamCallbacks for Recorder {
    fn on_metric(&self, metric: Metric) {
        self.push(format!("metric:{}", metric.api_id));
    }
    fn on_alert(&self, alert: AlertChanged) {
        self.push(format!("alert:{}", alert.alert.rule_id));
    }
    fn on_ping(&self, heartbeat: Heartbeat) {
        self.push(format!("ping:{}", heartbeat.t));
    }
    fn on_open(&self) {
        self.push("open".to_string());
    }
    fn on_close(&self) {
        self.push("close".to_string());
    }
    fn on_fallback(&self, active: bool) {
        self.push(format!("fallback:{}", active));
    }
}

fn config(max_retries: u32) -> ReconnectConfig {
    ReconnectConfig {
        max_retries,
        base_delay_ms: 500,
        max_delay_ms: 30_000,
        jitter_ms: 0,
        polling_interval_ms: 30_000,
        heartbeat_timeout_ms: 60_000,
    }
}

async fn wait_until(client: &StreamClient, check: impl FnMut(&ClientSnapshot) -> bool) -> ClientSnapshot {
    let mut rx = client.subscribe();
    let snapshot = *rx.wait_for(check).await.unwrap();
    snapshot
}

// =====================================================================================
// DRIVER BEHAVIOUR
// =====================================================================================

#[tokio::test(start_paused = true)]
async fn test_repeated_failures_fall_back_and_reconnect_resets() {
    let (transport, dials, _dialed) = ScriptedTransport::new(vec![
        Dial::Refuse,
        Dial::Refuse,
        Dial::Open(Vec::new()),
    ]);
    let recorder = Arc::new(Recorder::default());
    let client = StreamClient::spawn(transport, config(2), recorder.clone());

    let snapshot = wait_until(&client, |s| s.fallback).await;
    assert_eq!(snapshot.state, ConnectionState::Fallback);
    assert_eq!(snapshot.attempt, 2);
    // only the polling timer remains
    assert_eq!(snapshot.timers_armed, 1);
    assert_eq!(dials.load(Ordering::SeqCst), 2);

    client.reconnect();
    let snapshot = wait_until(&client, |s| s.state == ConnectionState::Open).await;
    assert!(!snapshot.fallback);
    assert_eq!(snapshot.attempt, 0);

    client.close().await;
    assert_eq!(
        recorder.seen(),
        vec!["fallback:true", "fallback:false", "open", "close"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_polls_until_stream_returns() {
    let (transport, _dials, _dialed) = ScriptedTransport::new(vec![
        Dial::Refuse,
        Dial::Refuse,
        Dial::Refuse,
        Dial::Open(Vec::new()),
    ]);
    let client = StreamClient::spawn(transport, config(2), Arc::new(Recorder::default()));

    let started = tokio::time::Instant::now();
    wait_until(&client, |s| s.fallback).await;

    // first poll fails, the second one opens the stream
    let snapshot = wait_until(&client, |s| s.state == ConnectionState::Open).await;
    assert!(!snapshot.fallback);
    assert!(started.elapsed() >= Duration::from_secs(60));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_frames_reach_callbacks() {
    let metric = Metric::new("api-1", 120, 200);
    let frames = vec![
        SseFrame::new("metric", serde_json::to_string(&metric).unwrap()),
        SseFrame::new("message", "ignored"),
        SseFrame::new("ping", r#"{"t":42}"#),
    ];
    let (transport, _dials, _dialed) = ScriptedTransport::new(vec![Dial::Open(frames)]);
    let recorder = Arc::new(Recorder::default());
    let client = StreamClient::spawn(transport, config(3), recorder.clone());

    let snapshot = wait_until(&client, |s| s.last_seen.is_some()).await;
    assert_eq!(snapshot.last_seen, Some(42));
    assert_eq!(snapshot.state, ConnectionState::Open);
    assert_eq!(recorder.seen(), vec!["open", "metric:api-1", "ping:42"]);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_is_redialed_after_heartbeat_timeout() {
    let (transport, _dials, mut dialed) =
        ScriptedTransport::new(vec![Dial::Open(Vec::new()), Dial::Open(Vec::new())]);
    let mut config = config(3);
    config.heartbeat_timeout_ms = 1_000;
    let client = StreamClient::spawn(transport, config, Arc::new(Recorder::default()));

    let started = tokio::time::Instant::now();
    assert_eq!(dialed.recv().await, Some(1));
    assert_eq!(dialed.recv().await, Some(2));
    // staleness timeout plus the first backoff step
    assert!(started.elapsed() >= Duration::from_millis(1_500));

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_timers() {
    let (transport, dials, _dialed) = ScriptedTransport::new(Vec::new());
    let recorder = Arc::new(Recorder::default());
    let client = StreamClient::spawn(transport, config(10), recorder.clone());

    wait_until(&client, |s| s.attempt >= 1).await;
    client.close().await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Closed);
    assert_eq!(snapshot.timers_armed, 0);

    let dialed_before = dials.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(dials.load(Ordering::SeqCst), dialed_before);
    assert_eq!(recorder.seen(), vec!["close"]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_driver() {
    let (transport, dials, _dialed) = ScriptedTransport::new(Vec::new());
    let recorder = Arc::new(Recorder::default());
    let client = StreamClient::spawn(transport, config(10), recorder.clone());

    wait_until(&client, |s| s.attempt >= 1).await;
    drop(client);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let dialed_before = dials.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(dials.load(Ordering::SeqCst), dialed_before);
    assert_eq!(recorder.seen(), vec!["close"]);
}

// =====================================================================================
// SSE TRANSPORT
// =====================================================================================

#[tokio::test]
async fn test_sse_transport_decodes_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(": hello\n\nevent: ping\ndata: {\"t\":7}\n\n"),
        )
        .mount(&server)
        .await;

    let transport = SseTransport::new(format!("{}/v1/stream", server.uri()));
    let frames: Vec<_> = transport.connect().await.unwrap().collect().await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].as_ref().unwrap(), &SseFrame::new("ping", "{\"t\":7}"));
}

#[tokio::test]
async fn test_sse_transport_rejects_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let transport = SseTransport::new(format!("{}/v1/stream", server.uri()));
    let Err(err) = transport.connect().await else {
        panic!("expected the 503 to be rejected");
    };
    assert_matches!(err, StreamError::Status(503));
}
