// =====================================================================================
// PROBE RUNNER - FIXED-INTERVAL PROBE LOOP
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

use shared_config::AppConfig;
use shared_models::Metric;

use crate::models::{ProbeError, ProbeTrigger};
use crate::services::ingest_client::IngestClient;
use crate::services::prober::ProbeClient;

/// What to probe and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeJob {
    pub api_id: String,
    pub target: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl ProbeJob {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_id: config.probe_api_id.clone(),
            target: config.probe_target.clone(),
            interval: Duration::from_millis(config.probe_interval_ms.max(1)),
            timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }
}

#[derive(Clone)]
pub struct ProbeRunner {
    job: ProbeJob,
    prober: ProbeClient,
    ingest: Arc<IngestClient>,
}

impl ProbeRunner {
    pub fn new(job: ProbeJob, prober: ProbeClient, ingest: Arc<IngestClient>) -> Self {
        Self { job, prober, ingest }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ProbeJob::from_config(config),
            ProbeClient::new(),
            Arc::new(IngestClient::from_config(config)),
        )
    }

    pub fn job(&self) -> &ProbeJob {
        &self.job
    }

    /// Probes once and delivers the metric, returning it on success.
    #[instrument(skip(self), fields(api_id = %self.job.api_id))]
    pub async fn probe_once(&self) -> Result<Metric, ProbeError> {
        let result = self.prober.probe(&self.job.target, self.job.timeout).await;
        let metric = result.into_metric(&self.job.api_id, ProbeTrigger::Scheduled);

        let attempts = self.ingest.deliver(&metric).await?;
        info!(
            latency_ms = metric.latency_ms,
            status_code = metric.status_code,
            attempts,
            "Probe metric sent"
        );
        Ok(metric)
    }

    /// Ticks until `shutdown` turns true. Each tick runs in its own task, so a
    /// slow delivery never holds back the next probe. In-flight probes finish
    /// before this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            target = %self.job.target,
            ingest = %self.ingest.url(),
            interval_ms = self.job.interval.as_millis() as u64,
            "Starting continuous probe"
        );

        let mut ticker = tokio::time::interval(self.job.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let runner = self.clone();
                    in_flight.spawn(async move {
                        if let Err(e) = runner.probe_once().await {
                            error!(api_id = %runner.job.api_id, error = %e, "Failed to send probe metric");
                        }
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Probe task panicked");
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "Probe loop stopping");
        while in_flight.join_next().await.is_some() {}
    }
}
