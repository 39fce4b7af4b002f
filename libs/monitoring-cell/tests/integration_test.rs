// =====================================================================================
// MONITORING CELL INTEGRATION TESTS
// =====================================================================================

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use monitoring_cell::{
    create_monitoring_router, AlertLifecycleManager, EvaluationDispatcher, EventBus,
    MonitoringHandlers, Notifier, NotifyError,
};
use shared_database::{InMemoryStore, MonitorStore};
use shared_models::{BusEvent, EventKind};
use shared_utils::test_utils::{MockPayloads, TestConfig};

struct SilentNotifier;

#[async_trait::async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    bus: EventBus,
    dispatcher: Arc<EvaluationDispatcher>,
}

fn setup_app() -> TestApp {
    let config = TestConfig::default().to_arc();
    let store = Arc::new(InMemoryStore::new());
    let bus = EventBus::new();
    let manager = Arc::new(AlertLifecycleManager::new(
        store.clone(),
        bus.clone(),
        Arc::new(SilentNotifier),
    ));
    let dispatcher = Arc::new(EvaluationDispatcher::new(manager));
    let handlers = Arc::new(MonitoringHandlers::new(
        config,
        store.clone(),
        bus.clone(),
        dispatcher.clone(),
    ));

    TestApp {
        router: create_monitoring_router(handlers),
        store,
        bus,
        dispatcher,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register(app: &TestApp, api_id: &str) {
    let (status, _) = send(
        &app.router,
        "POST",
        "/apis",
        Some(MockPayloads::create_target(api_id, "https://example.com/health")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_target_crud_round() {
    let app = setup_app();
    register(&app, "billing").await;

    let (status, body) = send(&app.router, "GET", "/apis/billing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expected_status"], json!([200]));
    assert_eq!(body["probe_interval"], 30);

    let (status, body) = send(
        &app.router,
        "PUT",
        "/apis/billing",
        Some(json!({"name": "Billing", "probe_interval": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Billing");
    assert_eq!(body["probe_interval"], 60);

    let (status, body) = send(&app.router, "GET", "/apis", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app.router, "GET", "/apis/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("unknown"));
}

#[tokio::test]
async fn test_duplicate_target_and_rule_conflict() {
    let app = setup_app();
    register(&app, "billing").await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/apis",
        Some(MockPayloads::create_target("billing", "https://example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.get("error").is_some());

    let rule = MockPayloads::latency_rule("lat-500", Some("billing"), 500);
    let (status, _) = send(&app.router, "POST", "/rules", Some(rule.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app.router, "POST", "/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_target_validation_errors() {
    let app = setup_app();

    let cases = [
        MockPayloads::create_target("ab", "https://example.com"),
        MockPayloads::create_target("bad id!", "https://example.com"),
        MockPayloads::create_target("billing", "not-a-url"),
        json!({"api_id": "billing", "name": "b", "base_url": "https://example.com", "probe_interval": 1}),
        json!({"api_id": "billing", "name": "b", "base_url": "https://example.com", "expected_status": [700]}),
    ];

    for body in cases {
        let (status, json) = send(&app.router, "POST", "/apis", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_ingest_accepts_and_evaluates_in_background() {
    let app = setup_app();
    register(&app, "billing").await;
    send(
        &app.router,
        "POST",
        "/rules",
        Some(MockPayloads::latency_rule("lat-500", Some("billing"), 500)),
    )
    .await;

    let metrics_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = metrics_seen.clone();
    let _sub = app.bus.subscribe(EventKind::Metric, move |event| {
        assert!(matches!(event, BusEvent::Metric(_)));
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    });

    let (status, body) = send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("billing", 1000, 200))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "accepted"}));
    assert_eq!(metrics_seen.load(std::sync::atomic::Ordering::SeqCst), 1);

    app.dispatcher.flush("billing").await;

    let (status, alerts) = send(&app.router, "GET", "/alerts?api_id=billing&state=triggered", None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["rule_id"], "lat-500");
    assert!(alerts[0]["payload"]["reason"].as_str().unwrap().contains("1000"));

    send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("billing", 50, 200))).await;
    app.dispatcher.flush("billing").await;

    let (_, resolved) = send(&app.router, "GET", "/alerts?state=resolved", None).await;
    assert_eq!(resolved.as_array().unwrap().len(), 1);

    let (status, metrics) = send(&app.router, "GET", "/metrics?api_id=billing&limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let metrics = metrics.as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["latency_ms"], 50);
}

#[tokio::test]
async fn test_ingest_rejects_unknown_target_and_bad_input() {
    let app = setup_app();

    let (status, _) = send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("ghost", 10, 200))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.dispatcher.active_workers(), 0);

    register(&app, "billing").await;
    let (status, _) = send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("billing", -1, 200))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("billing", 10, 99))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "api_id is required");
}

#[tokio::test]
async fn test_ingest_keeps_error_type_as_tag() {
    let app = setup_app();
    register(&app, "billing").await;

    let body = json!({
        "api_id": "billing",
        "latency_ms": 10000,
        "status_code": 504,
        "error": "timeout",
        "error_type": "timeout",
        "tags": {"probe": "manual"}
    });
    let (status, _) = send(&app.router, "POST", "/metrics", Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let stored = app.store.recent_metrics("billing", 1).await.unwrap();
    let tags = stored[0].tags.as_ref().unwrap();
    assert_eq!(tags["error_type"], "timeout");
    assert_eq!(tags["probe"], "manual");
    assert_eq!(stored[0].error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn test_rule_kinds_aliases_and_validation() {
    let app = setup_app();

    let (status, body) = send(
        &app.router,
        "POST",
        "/rules",
        Some(MockPayloads::status_rule("status-ok", None, &[204, 200])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["type"], "status_not_in");
    assert_eq!(body["threshold"], json!([200, 204]));
    assert!(body["api_id"].is_null());

    let legacy = json!({"rule_id": "legacy", "name": "legacy", "api_id": "billing", "type": "status_not", "threshold": [200]});
    let (status, _) = send(&app.router, "POST", "/rules", Some(legacy)).await;
    assert_eq!(status, StatusCode::CREATED);

    let invalid = [
        json!({"rule_id": "r1", "name": "n", "type": "latency_gt", "threshold": 5}),
        json!({"rule_id": "neg", "name": "n", "type": "latency_gt", "threshold": -5}),
        json!({"rule_id": "arr", "name": "n", "type": "latency_gt", "threshold": [1]}),
        json!({"rule_id": "num", "name": "n", "type": "status_not_in", "threshold": 200}),
        json!({"rule_id": "odd", "name": "n", "type": "p99_gt", "threshold": 5}),
    ];
    for body in invalid {
        let (status, _) = send(&app.router, "POST", "/rules", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (_, scoped) = send(&app.router, "GET", "/rules?api_id=billing", None).await;
    assert_eq!(scoped.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_toggle_and_delete_rule() {
    let app = setup_app();
    send(&app.router, "POST", "/rules", Some(MockPayloads::latency_rule("lat-500", None, 500))).await;

    let (status, body) = send(&app.router, "PATCH", "/rules/lat-500", Some(json!({"active": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, _) = send(&app.router, "DELETE", "/rules/lat-500", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, "DELETE", "/rules/lat-500", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, "PATCH", "/rules/lat-500", Some(json!({"active": true}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_target_cascades_and_retires_worker() {
    let app = setup_app();
    register(&app, "billing").await;
    send(&app.router, "POST", "/rules", Some(MockPayloads::latency_rule("lat-10", Some("billing"), 10))).await;
    send(&app.router, "POST", "/metrics", Some(MockPayloads::metric("billing", 100, 200))).await;
    app.dispatcher.flush("billing").await;
    assert_eq!(app.dispatcher.active_workers(), 1);

    let (status, _) = send(&app.router, "DELETE", "/apis/billing", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.dispatcher.active_workers(), 0);

    let (_, rules) = send(&app.router, "GET", "/rules?api_id=billing", None).await;
    assert!(rules.as_array().unwrap().is_empty());
    let (_, metrics) = send(&app.router, "GET", "/metrics?api_id=billing", None).await;
    assert!(metrics.as_array().unwrap().is_empty());
    let (_, alerts) = send(&app.router, "GET", "/alerts?api_id=billing", None).await;
    assert!(alerts.as_array().unwrap().is_empty());

    let (status, _) = send(&app.router, "DELETE", "/apis/billing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alerts_query_rejects_unknown_state() {
    let app = setup_app();
    let (status, body) = send(&app.router, "GET", "/alerts?state=open", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("open"));
}
