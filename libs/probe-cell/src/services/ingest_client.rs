// =====================================================================================
// INGEST CLIENT - METRIC DELIVERY WITH BOUNDED RETRY
// =====================================================================================

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use shared_config::AppConfig;
use shared_models::Metric;

use crate::models::ProbeError;
use crate::services::MetricSink;

const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_delay: Duration,
    /// Uniform jitter in `[0, max_jitter)` added to every delay.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(300),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after failed attempt `n` (0-based), before any jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.base_delay_for(attempt) + Duration::from_millis(jitter)
    }
}

/// Posts metrics to the ingestion endpoint.
pub struct IngestClient {
    client: Client,
    url: String,
    policy: RetryPolicy,
}

impl IngestClient {
    pub fn new(url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ingest_url.clone(), RetryPolicy::new(config.probe_post_retries))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the number of attempts used. Gives up after `retries + 1`.
    #[instrument(skip(self, metric), fields(api_id = %metric.api_id))]
    pub async fn deliver(&self, metric: &Metric) -> Result<u32, ProbeError> {
        let attempts = self.policy.attempts();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.post_once(metric).await {
                Ok(()) => {
                    debug!(attempt = attempt + 1, "Metric delivered");
                    return Ok(attempt + 1);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Metric post attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        Err(ProbeError::DeliveryAbandoned {
            attempts,
            last_error,
        })
    }

    async fn post_once(&self, metric: &Metric) -> Result<(), ProbeError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(POST_TIMEOUT)
            .json(metric)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSink for IngestClient {
    async fn forward(&self, metric: &Metric) -> Result<(), ProbeError> {
        self.deliver(metric).await.map(|_| ())
    }
}
