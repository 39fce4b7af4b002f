use async_trait::async_trait;

use monitoring_cell::IngestService;
use shared_models::Metric;

use crate::models::ProbeError;

/// Where probe metrics go: the remote ingest endpoint or the in-process
/// ingestion path.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn forward(&self, metric: &Metric) -> Result<(), ProbeError>;
}

#[async_trait]
impl MetricSink for IngestService {
    async fn forward(&self, metric: &Metric) -> Result<(), ProbeError> {
        self.ingest(metric.clone())
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Forward(e.to_string()))
    }
}
