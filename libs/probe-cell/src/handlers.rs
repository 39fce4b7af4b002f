// =====================================================================================
// PROBE CELL HANDLERS
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info, instrument};

use shared_database::MonitorStore;
use shared_models::AppError;
use shared_utils::validation::validate_range;

use crate::models::{
    ProbeError, ProbeRequest, ProbeResponse, ProbeTrigger, DEFAULT_PROBE_TIMEOUT_MS,
    MAX_PROBE_TIMEOUT_MS, MIN_PROBE_TIMEOUT_MS,
};
use crate::services::{MetricSink, ProbeClient};

pub struct ProbeHandlers {
    store: Arc<dyn MonitorStore>,
    prober: ProbeClient,
    sink: Arc<dyn MetricSink>,
}

impl ProbeHandlers {
    pub fn new(store: Arc<dyn MonitorStore>, prober: ProbeClient, sink: Arc<dyn MetricSink>) -> Self {
        Self { store, prober, sink }
    }
}

/// Probes a registered target now and feeds the result into ingestion.
#[instrument(skip(handlers, request))]
pub async fn run_probe(
    State(handlers): State<Arc<ProbeHandlers>>,
    Path(api_id): Path<String>,
    request: Option<Json<ProbeRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let timeout_ms = validate_range(
        "timeout",
        request.timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
        MIN_PROBE_TIMEOUT_MS,
        MAX_PROBE_TIMEOUT_MS,
    )?;

    let target = handlers
        .store
        .get_target(&api_id)
        .await
        .map_err(ProbeError::from)?
        .ok_or_else(|| ProbeError::TargetNotFound(api_id.clone()))?;

    let result = handlers
        .prober
        .probe(&target.base_url, Duration::from_millis(timeout_ms as u64))
        .await;
    let metric = result.into_metric(&target.api_id, ProbeTrigger::Manual);

    match handlers.sink.forward(&metric).await {
        Ok(()) => {
            info!(
                latency_ms = metric.latency_ms,
                status_code = metric.status_code,
                "Probe completed and metric forwarded"
            );
            let body = ProbeResponse {
                metric,
                warn: None,
                forward_error: None,
            };
            Ok((StatusCode::OK, Json(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to forward probe metric");
            let body = ProbeResponse {
                metric,
                warn: Some("failed to forward to ingest endpoint".to_string()),
                forward_error: Some(e.to_string()),
            };
            Ok((StatusCode::BAD_GATEWAY, Json(body)))
        }
    }
}
