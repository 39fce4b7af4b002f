// =====================================================================================
// MONITORING CELL - RULE EVALUATION & ALERT LIFECYCLE
// =====================================================================================
//
// This cell owns the monitoring core:
// - In-process event bus for metric and alert events
// - Rule evaluation and the per-(rule, target) alert lifecycle
// - Per-target background evaluation workers
// - Outbound notifications
// - Target, rule, metric and alert HTTP endpoints
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::MonitoringError;

pub use services::{
    AlertLifecycleManager, EvaluationDispatcher, EvaluationReport, EventBus, IngestService,
    Notifier, NotifyError, RuleTransition, SlackNotifier, Subscription,
};

pub use handlers::MonitoringHandlers;
pub use router::create_monitoring_router;
