use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A monitored HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub api_id: String,
    pub name: String,
    pub base_url: String,
    pub probe_interval: u64,
    pub expected_status: Vec<u16>,
    pub created_at: DateTime<Utc>,
}

/// Threshold condition evaluated against every metric of its scope.
///
/// `api_id == None` makes the rule global: it applies to every target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub rule_id: String,
    pub name: String,
    pub api_id: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn applies_to(&self, api_id: &str) -> bool {
        match &self.api_id {
            Some(scope) => scope == api_id,
            None => true,
        }
    }
}

/// Rule kind with its strongly typed parameter. The kind never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "threshold", rename_all = "snake_case")]
pub enum RuleKind {
    /// Triggers when latency is strictly greater than the threshold (ms).
    LatencyGt(u64),
    /// Triggers when the status code is not in the allowed set.
    StatusNotIn(BTreeSet<u16>),
}

impl RuleKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuleKind::LatencyGt(_) => "latency_gt",
            RuleKind::StatusNotIn(_) => "status_not_in",
        }
    }
}

/// One probe observation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub api_id: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub status_code: u16,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
}

impl Metric {
    pub fn new(api_id: impl Into<String>, latency_ms: u64, status_code: u16) -> Self {
        Self {
            api_id: api_id.into(),
            timestamp: Utc::now(),
            latency_ms,
            status_code,
            error: None,
            tags: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Triggered,
    Resolved,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Triggered => "triggered",
            AlertState::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triggered" => Ok(AlertState::Triggered),
            "resolved" => Ok(AlertState::Resolved),
            other => Err(format!("unknown alert state: {}", other)),
        }
    }
}

/// Snapshot of the metric that last moved the alert, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPayload {
    pub metric: Metric,
    pub reason: String,
}

/// Lifecycle record for one (rule, target) pair.
///
/// Resolving mutates the same record; a later trigger creates a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_id: Uuid,
    pub rule_id: String,
    pub api_id: String,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: AlertPayload,
}

impl Alert {
    pub fn triggered(rule_id: &str, api_id: &str, payload: AlertPayload) -> Self {
        let now = Utc::now();
        Self {
            alert_id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            api_id: api_id.to_string(),
            state: AlertState::Triggered,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state == AlertState::Triggered
    }
}
