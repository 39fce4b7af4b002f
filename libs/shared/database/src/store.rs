use async_trait::async_trait;
use thiserror::Error;

use shared_models::{Alert, AlertState, AppError, Metric, Rule, Target};

pub const DEFAULT_ALERT_LIMIT: usize = 50;
pub const MAX_ALERT_LIMIT: usize = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Backend(msg) => AppError::Database(msg),
        }
    }
}

/// Partial update for a target. The id is immutable.
#[derive(Debug, Clone, Default)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub probe_interval: Option<u64>,
    pub expected_status: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub api_id: Option<String>,
    pub state: Option<AlertState>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(0) | None => DEFAULT_ALERT_LIMIT,
            Some(limit) => limit.min(MAX_ALERT_LIMIT),
        }
    }
}

/// What a target deletion removed alongside the target itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub rules_removed: usize,
    pub metrics_removed: usize,
    pub alerts_removed: usize,
}

/// Keyed, sortable, queryable persistence for targets, rules, metrics and alerts.
///
/// Listing operations return newest records first.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn insert_target(&self, target: Target) -> Result<Target, StoreError>;
    async fn get_target(&self, api_id: &str) -> Result<Option<Target>, StoreError>;
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError>;
    async fn update_target(&self, api_id: &str, update: TargetUpdate) -> Result<Target, StoreError>;
    /// Removes the target together with its scoped rules, metrics and alerts.
    async fn delete_target(&self, api_id: &str) -> Result<CascadeSummary, StoreError>;

    async fn insert_rule(&self, rule: Rule) -> Result<Rule, StoreError>;
    async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, StoreError>;
    /// Exact scope match when `api_id` is given; global rules are not included.
    async fn list_rules(&self, api_id: Option<&str>) -> Result<Vec<Rule>, StoreError>;
    async fn set_rule_active(&self, rule_id: &str, active: bool) -> Result<Rule, StoreError>;
    async fn delete_rule(&self, rule_id: &str) -> Result<(), StoreError>;
    /// Active rules scoped to the target plus active global rules.
    async fn active_rules_for_target(&self, api_id: &str) -> Result<Vec<Rule>, StoreError>;

    async fn append_metric(&self, metric: Metric) -> Result<Metric, StoreError>;
    async fn recent_metrics(&self, api_id: &str, limit: usize) -> Result<Vec<Metric>, StoreError>;

    async fn find_triggered_alert(&self, rule_id: &str, api_id: &str) -> Result<Option<Alert>, StoreError>;
    /// Fails with `Conflict` when the pair already has a triggered alert.
    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError>;
    async fn update_alert(&self, alert: Alert) -> Result<Alert, StoreError>;
    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<Alert>, StoreError>;
}
