// =====================================================================================
// MONITORING CELL MODELS
// =====================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::AppError;

// -------------------------------------------------------------------------------------
// Targets
// -------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub api_id: String,
    pub name: String,
    pub base_url: String,
    pub probe_interval: Option<i64>,
    pub expected_status: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTargetRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub probe_interval: Option<i64>,
    pub expected_status: Option<Vec<i64>>,
}

// -------------------------------------------------------------------------------------
// Metrics
// -------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IngestMetricRequest {
    pub api_id: String,
    pub latency_ms: i64,
    pub status_code: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub tags: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestAccepted {
    pub status: String,
}

impl IngestAccepted {
    pub fn accepted() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub api_id: Option<String>,
    pub limit: Option<usize>,
}

pub const DEFAULT_METRICS_LIMIT: usize = 20;

// -------------------------------------------------------------------------------------
// Rules and alerts
// -------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub threshold: Value,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RuleQuery {
    pub api_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRuleRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub api_id: Option<String>,
    pub state: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------------------------------------------------------------------
// Errors
// -------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MonitoringError> for AppError {
    fn from(err: MonitoringError) -> Self {
        match err {
            MonitoringError::TargetNotFound(_) | MonitoringError::RuleNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            MonitoringError::InvalidRule(msg) => AppError::ValidationError(msg),
            MonitoringError::Store(e) => e.into(),
        }
    }
}
