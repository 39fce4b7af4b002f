use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub slack_webhook: Option<String>,
    pub probe_default_interval_secs: u64,
    pub stream_heartbeat_secs: u64,
    pub stream_observer_buffer: usize,
    pub ingest_url: String,
    pub probe_target: String,
    pub probe_api_id: String,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_post_retries: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = parsed_var("PORT", 3000);

        let config = Self {
            port,
            slack_webhook: env::var("SLACK_WEBHOOK")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            probe_default_interval_secs: parsed_var("PROBE_DEFAULT_INTERVAL", 30),
            stream_heartbeat_secs: parsed_var("STREAM_HEARTBEAT_SECS", 25),
            stream_observer_buffer: parsed_var("STREAM_OBSERVER_BUFFER", 16),
            ingest_url: env::var("INGEST_URL")
                .unwrap_or_else(|_| {
                    warn!("INGEST_URL not set, using local ingest endpoint");
                    format!("http://127.0.0.1:{}/v1/metrics", port)
                }),
            probe_target: env::var("PROBE_TARGET")
                .unwrap_or_else(|_| {
                    warn!("PROBE_TARGET not set, using default");
                    "https://httpbin.org/delay/0".to_string()
                }),
            probe_api_id: env::var("PROBE_API_ID")
                .unwrap_or_else(|_| {
                    warn!("PROBE_API_ID not set, using default");
                    "demo-api".to_string()
                }),
            probe_interval_ms: parsed_var("PROBE_INTERVAL_MS", 30_000),
            probe_timeout_ms: parsed_var("PROBE_TIMEOUT_MS", 10_000),
            probe_post_retries: parsed_var("POST_RETRIES", 3),
        };

        if !config.is_notification_configured() {
            warn!("SLACK_WEBHOOK not set - alert notifications will only be logged");
        }

        config
    }

    pub fn is_notification_configured(&self) -> bool {
        self.slack_webhook.is_some()
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            slack_webhook: None,
            probe_default_interval_secs: 30,
            stream_heartbeat_secs: 25,
            stream_observer_buffer: 16,
            ingest_url: "http://127.0.0.1:3000/v1/metrics".to_string(),
            probe_target: "https://httpbin.org/delay/0".to_string(),
            probe_api_id: "demo-api".to_string(),
            probe_interval_ms: 30_000,
            probe_timeout_ms: 10_000,
            probe_post_retries: 3,
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", name, default);
            default
        }
    }
}
