use dotenv::dotenv;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use probe_cell::ProbeRunner;
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let runner = ProbeRunner::from_config(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe_loop = tokio::spawn(runner.run(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received, waiting for in-flight probes");
    shutdown_tx.send_replace(true);

    probe_loop.await?;
    Ok(())
}
