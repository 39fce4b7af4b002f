// =====================================================================================
// STREAM CELL ROUTER
// =====================================================================================

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::stream_events;
use crate::services::StreamHub;

pub fn create_stream_router(hub: Arc<StreamHub>) -> Router {
    Router::new()
        .route("/stream", get(stream_events))
        .with_state(hub)
}
