// =====================================================================================
// PROBE CLIENT - ONE TIMED GET PER PROBE
// =====================================================================================

use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::models::{ProbeOutcome, ProbeResult};

#[derive(Clone, Default)]
pub struct ProbeClient {
    client: Client,
}

impl ProbeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never fails: every way a request can end is an outcome.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        let outcome = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status();
                // drain so latency covers the body as well
                match response.bytes().await {
                    Ok(_) if status.is_success() => ProbeOutcome::Success {
                        status: status.as_u16(),
                    },
                    Ok(_) => ProbeOutcome::HttpError {
                        status: status.as_u16(),
                    },
                    Err(e) => failure_outcome(e),
                }
            }
            Err(e) => failure_outcome(e),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        debug!(latency_ms, error_type = outcome.error_type(), "Probe finished");
        ProbeResult {
            outcome,
            latency_ms,
            target: url.to_string(),
            timeout,
        }
    }
}

fn failure_outcome(e: reqwest::Error) -> ProbeOutcome {
    if e.is_timeout() {
        ProbeOutcome::Timeout
    } else {
        ProbeOutcome::NetworkError {
            message: e.to_string(),
        }
    }
}
