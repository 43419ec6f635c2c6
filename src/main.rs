//! ayaye daemon - main entry point.

use std::sync::Arc;

use ayaye::config::Config;
use ayaye::generation::OpenAiGenerator;
use ayaye::queue::RedisQueue;
use ayaye::registry::RestRegistry;
use ayaye::telemetry;
use ayaye::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting ayaye daemon"
    );

    telemetry::install_metrics(&config.observability)?;

    let queue = Arc::new(RedisQueue::connect(&config.redis.url)?);
    let registry = Arc::new(RestRegistry::new(&config.registry)?);
    let generator = Arc::new(OpenAiGenerator::new(&config.generation)?);

    let worker = Worker::startup(&config, queue, registry, generator).await?;

    worker.run(shutdown_signal()).await?;
    tracing::info!("Daemon shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
