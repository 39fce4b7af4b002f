use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use shared_models::{Alert, Metric, Rule, Target};

use crate::store::{AlertFilter, CascadeSummary, MonitorStore, StoreError, TargetUpdate};

/// Process-local store backed by `RwLock`ed maps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    targets: RwLock<HashMap<String, Target>>,
    rules: RwLock<HashMap<String, Rule>>,
    metrics: RwLock<HashMap<String, Vec<Metric>>>,
    // insertion order; newest last
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for InMemoryStore {
    async fn insert_target(&self, target: Target) -> Result<Target, StoreError> {
        let mut targets = self.targets.write().await;
        if targets.contains_key(&target.api_id) {
            return Err(StoreError::Conflict(format!("api_id already exists: {}", target.api_id)));
        }
        targets.insert(target.api_id.clone(), target.clone());
        debug!(api_id = %target.api_id, "Target stored");
        Ok(target)
    }

    async fn get_target(&self, api_id: &str) -> Result<Option<Target>, StoreError> {
        Ok(self.targets.read().await.get(api_id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let targets = self.targets.read().await;
        let mut list: Vec<Target> = targets.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.api_id.cmp(&b.api_id)));
        Ok(list)
    }

    async fn update_target(&self, api_id: &str, update: TargetUpdate) -> Result<Target, StoreError> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(api_id)
            .ok_or_else(|| StoreError::not_found("target", api_id))?;

        if let Some(name) = update.name {
            target.name = name;
        }
        if let Some(base_url) = update.base_url {
            target.base_url = base_url;
        }
        if let Some(interval) = update.probe_interval {
            target.probe_interval = interval;
        }
        if let Some(expected) = update.expected_status {
            target.expected_status = expected;
        }

        Ok(target.clone())
    }

    async fn delete_target(&self, api_id: &str) -> Result<CascadeSummary, StoreError> {
        let mut targets = self.targets.write().await;
        if targets.remove(api_id).is_none() {
            return Err(StoreError::not_found("target", api_id));
        }

        let rules_removed = {
            let mut rules = self.rules.write().await;
            let before = rules.len();
            rules.retain(|_, rule| rule.api_id.as_deref() != Some(api_id));
            before - rules.len()
        };

        let metrics_removed = self
            .metrics
            .write()
            .await
            .remove(api_id)
            .map(|series| series.len())
            .unwrap_or(0);

        let alerts_removed = {
            let mut alerts = self.alerts.write().await;
            let before = alerts.len();
            alerts.retain(|alert| alert.api_id != api_id);
            before - alerts.len()
        };

        let summary = CascadeSummary {
            rules_removed,
            metrics_removed,
            alerts_removed,
        };
        debug!(api_id = %api_id, ?summary, "Target deleted with cascade");
        Ok(summary)
    }

    async fn insert_rule(&self, rule: Rule) -> Result<Rule, StoreError> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.rule_id) {
            return Err(StoreError::Conflict(format!("rule_id already exists: {}", rule.rule_id)));
        }
        rules.insert(rule.rule_id.clone(), rule.clone());
        Ok(rule)
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.read().await.get(rule_id).cloned())
    }

    async fn list_rules(&self, api_id: Option<&str>) -> Result<Vec<Rule>, StoreError> {
        let rules = self.rules.read().await;
        let mut list: Vec<Rule> = rules
            .values()
            .filter(|rule| match api_id {
                Some(id) => rule.api_id.as_deref() == Some(id),
                None => true,
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.rule_id.cmp(&b.rule_id)));
        Ok(list)
    }

    async fn set_rule_active(&self, rule_id: &str, active: bool) -> Result<Rule, StoreError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| StoreError::not_found("rule", rule_id))?;
        rule.active = active;
        Ok(rule.clone())
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<(), StoreError> {
        self.rules
            .write()
            .await
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("rule", rule_id))
    }

    async fn active_rules_for_target(&self, api_id: &str) -> Result<Vec<Rule>, StoreError> {
        let rules = self.rules.read().await;
        let mut list: Vec<Rule> = rules
            .values()
            .filter(|rule| rule.active && rule.applies_to(api_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.rule_id.cmp(&b.rule_id)));
        Ok(list)
    }

    async fn append_metric(&self, metric: Metric) -> Result<Metric, StoreError> {
        let mut metrics = self.metrics.write().await;
        metrics
            .entry(metric.api_id.clone())
            .or_default()
            .push(metric.clone());
        Ok(metric)
    }

    async fn recent_metrics(&self, api_id: &str, limit: usize) -> Result<Vec<Metric>, StoreError> {
        let metrics = self.metrics.read().await;
        let mut list: Vec<Metric> = metrics
            .get(api_id)
            .map(|series| series.iter().rev().cloned().collect())
            .unwrap_or_default();
        // stable sort: equal timestamps stay newest-inserted first
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list.truncate(limit);
        Ok(list)
    }

    async fn find_triggered_alert(&self, rule_id: &str, api_id: &str) -> Result<Option<Alert>, StoreError> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .find(|alert| alert.is_triggered() && alert.rule_id == rule_id && alert.api_id == api_id)
            .cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().await;
        if alert.is_triggered()
            && alerts
                .iter()
                .any(|a| a.is_triggered() && a.rule_id == alert.rule_id && a.api_id == alert.api_id)
        {
            return Err(StoreError::Conflict(format!(
                "triggered alert already exists for rule {} on {}",
                alert.rule_id, alert.api_id
            )));
        }
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn update_alert(&self, alert: Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().await;
        let slot = alerts
            .iter_mut()
            .find(|a| a.alert_id == alert.alert_id)
            .ok_or_else(|| StoreError::not_found("alert", alert.alert_id.to_string()))?;
        *slot = alert.clone();
        Ok(alert)
    }

    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let limit = filter.effective_limit();
        let alerts = self.alerts.read().await;
        let mut list: Vec<Alert> = alerts
            .iter()
            .rev()
            .filter(|alert| filter.api_id.as_deref().map_or(true, |id| alert.api_id == id))
            .filter(|alert| filter.state.map_or(true, |state| alert.state == state))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit);
        Ok(list)
    }
}
