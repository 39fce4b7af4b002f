// =====================================================================================
// STREAM HTTP HANDLERS
// =====================================================================================

use std::sync::Arc;

use axum::{extract::State, response::sse::Sse};
use tracing::info;

use crate::services::{ObserverStream, StreamHub};

/// `GET /stream`. Stays open until the client leaves or the hub shuts down.
pub async fn stream_events(State(hub): State<Arc<StreamHub>>) -> Sse<ObserverStream> {
    let stream = hub.connect();
    info!(observers = hub.active_observers(), "Stream observer attached");
    Sse::new(stream)
}
