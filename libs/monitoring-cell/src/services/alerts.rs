// =====================================================================================
// ALERT LIFECYCLE MANAGER
// =====================================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use shared_database::MonitorStore;
use shared_models::{Alert, AlertChanged, AlertPayload, AlertState, BusEvent, Metric, Rule};

use crate::models::MonitoringError;
use crate::services::evaluator::evaluate;
use crate::services::event_bus::EventBus;
use crate::services::notify::Notifier;

pub const CLEARED_REASON: &str = "condition cleared";

/// What one metric did to one (rule, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleTransition {
    /// No triggered alert existed; a new one was created.
    Created(Uuid),
    /// The triggered alert got a fresh payload. No event is published.
    Refreshed(Uuid),
    Resolved(Uuid),
    Unchanged,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub transition: RuleTransition,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub api_id: String,
    pub outcomes: Vec<RuleOutcome>,
}

impl EvaluationReport {
    pub fn transition_for(&self, rule_id: &str) -> Option<&RuleTransition> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.rule_id == rule_id)
            .map(|outcome| &outcome.transition)
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.transition, RuleTransition::Failed(_)))
            .count()
    }
}

/// Owns every alert state transition. Nothing else writes alerts.
pub struct AlertLifecycleManager {
    store: Arc<dyn MonitorStore>,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
}

impl AlertLifecycleManager {
    pub fn new(store: Arc<dyn MonitorStore>, bus: EventBus, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            bus,
            notifier,
        }
    }

    /// Runs one evaluation pass for a durably written metric. Each rule is
    /// isolated: a failure is recorded as `Failed` and the pass continues.
    #[instrument(skip(self, metric), fields(api_id = %metric.api_id))]
    pub async fn on_metric_ingested(&self, metric: &Metric) -> Result<EvaluationReport, MonitoringError> {
        let mut report = EvaluationReport {
            api_id: metric.api_id.clone(),
            outcomes: Vec::new(),
        };
        // the target may have been deleted while this metric was queued
        if self.store.get_target(&metric.api_id).await?.is_none() {
            debug!(api_id = %metric.api_id, "Skipping evaluation for deleted target");
            return Ok(report);
        }

        let rules = self.store.active_rules_for_target(&metric.api_id).await?;
        report.outcomes.reserve(rules.len());

        for rule in rules {
            let transition = match self.apply_rule(&rule, metric).await {
                Ok(transition) => transition,
                Err(e) => {
                    error!(rule_id = %rule.rule_id, api_id = %metric.api_id, error = %e, "Rule evaluation failed");
                    RuleTransition::Failed(e.to_string())
                }
            };
            report.outcomes.push(RuleOutcome {
                rule_id: rule.rule_id,
                transition,
            });
        }

        Ok(report)
    }

    async fn apply_rule(&self, rule: &Rule, metric: &Metric) -> Result<RuleTransition, MonitoringError> {
        let verdict = evaluate(rule, metric);
        let existing = self
            .store
            .find_triggered_alert(&rule.rule_id, &metric.api_id)
            .await?;

        match (verdict.triggered, existing) {
            (true, None) => {
                let reason = verdict.reason.unwrap_or_default();
                let alert = Alert::triggered(
                    &rule.rule_id,
                    &metric.api_id,
                    AlertPayload {
                        metric: metric.clone(),
                        reason: reason.clone(),
                    },
                );
                let alert = self.store.insert_alert(alert).await?;

                info!(
                    alert_id = %alert.alert_id,
                    rule_id = %rule.rule_id,
                    api_id = %metric.api_id,
                    reason = %reason,
                    "Alert triggered"
                );

                let alert_id = alert.alert_id;
                self.bus.publish(BusEvent::Alert(AlertChanged::new(alert)));
                self.send_notification(format!(
                    "Alert: {} triggered for {} — {}",
                    rule.name, metric.api_id, reason
                ));
                Ok(RuleTransition::Created(alert_id))
            }
            (true, Some(mut alert)) => {
                alert.payload = AlertPayload {
                    metric: metric.clone(),
                    reason: verdict.reason.unwrap_or_default(),
                };
                alert.updated_at = Utc::now();
                let alert = self.store.update_alert(alert).await?;
                Ok(RuleTransition::Refreshed(alert.alert_id))
            }
            (false, Some(mut alert)) => {
                alert.state = AlertState::Resolved;
                alert.payload = AlertPayload {
                    metric: metric.clone(),
                    reason: CLEARED_REASON.to_string(),
                };
                alert.updated_at = Utc::now();
                let alert = self.store.update_alert(alert).await?;

                info!(
                    alert_id = %alert.alert_id,
                    rule_id = %rule.rule_id,
                    api_id = %metric.api_id,
                    "Alert resolved"
                );

                let alert_id = alert.alert_id;
                self.bus.publish(BusEvent::Alert(AlertChanged::new(alert)));
                self.send_notification(format!("Resolved: {} for {}", rule.name, metric.api_id));
                Ok(RuleTransition::Resolved(alert_id))
            }
            (false, None) => Ok(RuleTransition::Unchanged),
        }
    }

    fn send_notification(&self, text: String) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&text).await {
                error!(error = %e, "Notification failed");
            }
        });
    }
}
