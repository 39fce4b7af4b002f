// =====================================================================================
// STREAM CELL MODELS
// =====================================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_models::{AlertChanged, AppError, Heartbeat, Metric};

pub const METRIC_EVENT: &str = "metric";
pub const ALERT_EVENT: &str = "alert";
pub const PING_EVENT: &str = "ping";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream connection failed: {0}")]
    Connect(String),

    #[error("Stream endpoint returned status {0}")]
    Status(u16),

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream ended by server")]
    Ended,

    #[error("Malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            StreamError::Connect(err.to_string())
        } else {
            StreamError::Transport(err.to_string())
        }
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Typed payload of a received frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Metric(Metric),
    Alert(AlertChanged),
    Ping(Heartbeat),
    /// Event name outside the closed set; ignored beyond liveness.
    Other(String),
}

impl StreamEvent {
    pub fn decode(frame: &SseFrame) -> Result<Self, StreamError> {
        let payload_err = |source| StreamError::Payload {
            event: frame.event.clone(),
            source,
        };
        match frame.event.as_str() {
            METRIC_EVENT => serde_json::from_str(&frame.data).map(StreamEvent::Metric).map_err(payload_err),
            ALERT_EVENT => serde_json::from_str(&frame.data).map(StreamEvent::Alert).map_err(payload_err),
            PING_EVENT => serde_json::from_str(&frame.data).map(StreamEvent::Ping).map_err(payload_err),
            other => Ok(StreamEvent::Other(other.to_string())),
        }
    }
}

// -------------------------------------------------------------------------------------
// Client reconnection
// -------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Fallback,
    Closed,
}

/// Backoff and fallback tuning for the stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Consecutive failures before switching to polling fallback.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Uniform jitter in `[-jitter_ms, +jitter_ms]` added to each backoff.
    pub jitter_ms: u64,
    pub polling_interval_ms: u64,
    /// An open stream silent for this long is treated as dead.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 200,
            polling_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

impl ReconnectConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Externally visible client status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    pub state: ConnectionState,
    pub fallback: bool,
    pub attempt: u32,
    /// Epoch millis carried by the last heartbeat.
    pub last_seen: Option<i64>,
    pub timers_armed: usize,
}

impl Default for ClientSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            fallback: false,
            attempt: 0,
            last_seen: None,
            timers_armed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_decode_known_and_unknown_events() {
        let ping = SseFrame::new(PING_EVENT, r#"{"t":1700000000000}"#);
        assert_eq!(
            StreamEvent::decode(&ping).unwrap(),
            StreamEvent::Ping(Heartbeat { t: 1_700_000_000_000 })
        );

        let other = SseFrame::new("message", "hello");
        assert_matches!(StreamEvent::decode(&other), Ok(StreamEvent::Other(name)) if name == "message");

        let broken = SseFrame::new(METRIC_EVENT, "{not json");
        assert_matches!(StreamEvent::decode(&broken), Err(StreamError::Payload { event, .. }) if event == "metric");
    }

    #[test]
    fn test_default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_retries, 6);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.jitter_ms, 200);
        assert_eq!(config.polling_interval(), Duration::from_secs(30));
    }
}
