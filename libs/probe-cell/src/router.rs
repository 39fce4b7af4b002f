// =====================================================================================
// PROBE CELL ROUTER
// =====================================================================================

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers::{run_probe, ProbeHandlers};

pub fn create_probe_router(handlers: Arc<ProbeHandlers>) -> Router {
    Router::new()
        .route("/probe/{api_id}", post(run_probe))
        .with_state(handlers)
}
