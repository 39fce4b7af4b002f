use std::sync::Arc;

use tracing::{debug, instrument};

use shared_database::MonitorStore;
use shared_models::{BusEvent, Metric};

use crate::models::MonitoringError;
use crate::services::dispatcher::EvaluationDispatcher;
use crate::services::event_bus::EventBus;

/// Ingestion boundary: durable write, then fan-out, then background evaluation.
pub struct IngestService {
    store: Arc<dyn MonitorStore>,
    bus: EventBus,
    dispatcher: Arc<EvaluationDispatcher>,
}

impl IngestService {
    pub fn new(store: Arc<dyn MonitorStore>, bus: EventBus, dispatcher: Arc<EvaluationDispatcher>) -> Self {
        Self {
            store,
            bus,
            dispatcher,
        }
    }

    /// Returns as soon as the metric is stored; evaluation is never awaited.
    #[instrument(skip(self, metric), fields(api_id = %metric.api_id))]
    pub async fn ingest(&self, metric: Metric) -> Result<Metric, MonitoringError> {
        if self.store.get_target(&metric.api_id).await?.is_none() {
            return Err(MonitoringError::TargetNotFound(metric.api_id));
        }

        let metric = self.store.append_metric(metric).await?;
        let delivered = self.bus.publish(BusEvent::Metric(metric.clone()));
        self.dispatcher.submit(metric.clone());

        debug!(
            latency_ms = metric.latency_ms,
            status_code = metric.status_code,
            observers = delivered,
            "Metric ingested"
        );
        Ok(metric)
    }

    pub fn dispatcher(&self) -> &Arc<EvaluationDispatcher> {
        &self.dispatcher
    }
}
