// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use std::sync::Arc;

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::{
    create_rule, create_target, delete_rule, delete_target, get_target, ingest_metric,
    list_alerts, list_metrics, list_rules, list_targets, toggle_rule, update_target,
    MonitoringHandlers,
};

/// Target, rule, metric and alert routes. Mounted under `/v1` by the API.
pub fn create_monitoring_router(handlers: Arc<MonitoringHandlers>) -> Router {
    Router::new()
        .route("/apis", get(list_targets).post(create_target))
        .route(
            "/apis/{api_id}",
            get(get_target).put(update_target).delete(delete_target),
        )
        .route("/metrics", get(list_metrics).post(ingest_metric))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{rule_id}", patch(toggle_rule).delete(delete_rule))
        .route("/alerts", get(list_alerts))
        .with_state(handlers)
}
