use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use shared_config::AppConfig;
use shared_models::{Metric, Rule, RuleKind, Target};

pub struct TestConfig {
    pub slack_webhook: Option<String>,
    pub ingest_url: String,
    pub observer_buffer: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            slack_webhook: None,
            ingest_url: "http://127.0.0.1:3000/v1/metrics".to_string(),
            observer_buffer: 16,
        }
    }
}

impl TestConfig {
    pub fn with_webhook(url: &str) -> Self {
        Self {
            slack_webhook: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            slack_webhook: self.slack_webhook.clone(),
            ingest_url: self.ingest_url.clone(),
            stream_observer_buffer: self.observer_buffer,
            probe_timeout_ms: 2_000,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestTarget {
    pub api_id: String,
    pub name: String,
    pub base_url: String,
    pub expected_status: Vec<u16>,
}

impl Default for TestTarget {
    fn default() -> Self {
        Self::new("billing-api")
    }
}

impl TestTarget {
    pub fn new(api_id: &str) -> Self {
        Self {
            api_id: api_id.to_string(),
            name: format!("{} service", api_id),
            base_url: "https://example.com/health".to_string(),
            expected_status: vec![200],
        }
    }

    pub fn at(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn to_target(&self) -> Target {
        Target {
            api_id: self.api_id.clone(),
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            probe_interval: 30,
            expected_status: self.expected_status.clone(),
            created_at: Utc::now(),
        }
    }
}

pub struct TestRule {
    pub rule_id: String,
    pub name: String,
    pub api_id: Option<String>,
    pub kind: RuleKind,
    pub active: bool,
}

impl TestRule {
    pub fn latency(rule_id: &str, threshold: u64) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            name: format!("Latency over {}ms", threshold),
            api_id: None,
            kind: RuleKind::LatencyGt(threshold),
            active: true,
        }
    }

    pub fn status(rule_id: &str, allowed: &[u16]) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            name: "Unexpected status".to_string(),
            api_id: None,
            kind: RuleKind::StatusNotIn(allowed.iter().copied().collect::<BTreeSet<u16>>()),
            active: true,
        }
    }

    pub fn for_target(mut self, api_id: &str) -> Self {
        self.api_id = Some(api_id.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn to_rule(&self) -> Rule {
        Rule {
            rule_id: self.rule_id.clone(),
            name: self.name.clone(),
            api_id: self.api_id.clone(),
            kind: self.kind.clone(),
            active: self.active,
            created_at: Utc::now(),
        }
    }
}

pub fn metric(api_id: &str, latency_ms: u64, status_code: u16) -> Metric {
    Metric::new(api_id, latency_ms, status_code)
}

/// JSON request bodies as a client would send them.
pub struct MockPayloads;

impl MockPayloads {
    pub fn create_target(api_id: &str, base_url: &str) -> serde_json::Value {
        json!({
            "api_id": api_id,
            "name": format!("{} service", api_id),
            "base_url": base_url,
            "probe_interval": 30,
            "expected_status": [200]
        })
    }

    pub fn latency_rule(rule_id: &str, api_id: Option<&str>, threshold: u64) -> serde_json::Value {
        json!({
            "rule_id": rule_id,
            "name": format!("Latency over {}ms", threshold),
            "api_id": api_id,
            "type": "latency_gt",
            "threshold": threshold
        })
    }

    pub fn status_rule(rule_id: &str, api_id: Option<&str>, allowed: &[u16]) -> serde_json::Value {
        json!({
            "rule_id": rule_id,
            "name": "Unexpected status",
            "api_id": api_id,
            "type": "status_not_in",
            "threshold": allowed
        })
    }

    pub fn metric(api_id: &str, latency_ms: i64, status_code: i64) -> serde_json::Value {
        json!({
            "api_id": api_id,
            "latency_ms": latency_ms,
            "status_code": status_code
        })
    }
}
