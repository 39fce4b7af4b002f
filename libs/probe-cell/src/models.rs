// =====================================================================================
// PROBE CELL MODELS
// =====================================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use shared_models::{AppError, Metric};

/// Reported for a probe that ran out of time.
pub const TIMEOUT_STATUS: u16 = 504;
/// Reported for a probe that never got a response.
pub const NETWORK_ERROR_STATUS: u16 = 502;

pub const MIN_PROBE_TIMEOUT_MS: i64 = 100;
pub const MAX_PROBE_TIMEOUT_MS: i64 = 60_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: i64 = 10_000;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ingest endpoint returned status {0}")]
    Rejected(u16),

    #[error("Metric delivery abandoned after {attempts} attempts: {last_error}")]
    DeliveryAbandoned { attempts: u32, last_error: String },

    #[error("Metric forwarding failed: {0}")]
    Forward(String),

    #[error("Store error: {0}")]
    Store(#[from] shared_database::StoreError),
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::TargetNotFound(id) => AppError::NotFound(format!("Target {} not found", id)),
            ProbeError::Store(e) => AppError::Database(e.to_string()),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}

/// How a single probe request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { status: u16 },
    Timeout,
    NetworkError { message: String },
    HttpError { status: u16 },
}

impl ProbeOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Success { status } | ProbeOutcome::HttpError { status } => *status,
            ProbeOutcome::Timeout => TIMEOUT_STATUS,
            ProbeOutcome::NetworkError { .. } => NETWORK_ERROR_STATUS,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProbeOutcome::Success { .. } => "none",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::NetworkError { .. } => "network",
            ProbeOutcome::HttpError { .. } => "http_error",
        }
    }

    pub fn error_message(&self, timeout: Duration) -> Option<String> {
        match self {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Timeout => Some(format!("timeout of {}ms exceeded", timeout.as_millis())),
            ProbeOutcome::NetworkError { message } => Some(message.clone()),
            ProbeOutcome::HttpError { status } => Some(format!("request failed with status code {}", status)),
        }
    }
}

/// Whether a probe came from the schedule or an explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTrigger {
    Scheduled,
    Manual,
}

impl ProbeTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeTrigger::Scheduled => "scheduled",
            ProbeTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub latency_ms: u64,
    pub target: String,
    pub timeout: Duration,
}

impl ProbeResult {
    pub fn into_metric(self, api_id: &str, trigger: ProbeTrigger) -> Metric {
        let mut tags = Map::new();
        tags.insert("target".to_string(), Value::String(self.target.clone()));
        tags.insert("probe".to_string(), Value::String(trigger.as_str().to_string()));
        tags.insert(
            "error_type".to_string(),
            Value::String(self.outcome.error_type().to_string()),
        );

        let mut metric = Metric::new(api_id, self.latency_ms, self.outcome.status_code());
        metric.error = self.outcome.error_message(self.timeout);
        metric.tags = Some(tags);
        metric
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeRequest {
    /// Milliseconds; defaults to ten seconds.
    pub timeout: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    #[serde(rename = "forwardError", skip_serializing_if = "Option::is_none")]
    pub forward_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            outcome,
            latency_ms: 87,
            target: "https://example.com/health".to_string(),
            timeout: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let metric = result(ProbeOutcome::Timeout).into_metric("orders-api", ProbeTrigger::Scheduled);
        let tags = metric.tags.unwrap();

        assert_eq!(metric.status_code, 504);
        assert_eq!(metric.latency_ms, 87);
        assert_eq!(metric.error.as_deref(), Some("timeout of 1500ms exceeded"));
        assert_eq!(tags["error_type"], "timeout");
        assert_eq!(tags["probe"], "scheduled");
        assert_eq!(tags["target"], "https://example.com/health");
    }

    #[test]
    fn test_outcome_statuses_and_error_types() {
        let network = ProbeOutcome::NetworkError {
            message: "connection refused".to_string(),
        };
        assert_eq!(network.status_code(), 502);
        assert_eq!(network.error_type(), "network");

        let http = ProbeOutcome::HttpError { status: 503 };
        assert_eq!(http.status_code(), 503);
        assert_eq!(http.error_type(), "http_error");

        let ok = result(ProbeOutcome::Success { status: 204 }).into_metric("orders-api", ProbeTrigger::Manual);
        assert_eq!(ok.status_code, 204);
        assert!(ok.error.is_none());
        assert_eq!(ok.tags.unwrap()["error_type"], "none");
    }
}
