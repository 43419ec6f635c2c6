//! Logging and metrics.
//!
//! Structured logs via `tracing`, counters and the processing histogram via
//! `metrics` with a Prometheus exporter serving its own HTTP listener. The
//! exporter thread shares no mutable state with the processing loop.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::error::{AyayeError, Result};

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Install the Prometheus exporter and register metric descriptions.
/// Must be called from within the tokio runtime.
pub fn install_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AyayeError::config(format!("cannot start metrics exporter on {addr}: {e}")))?;

    register_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_histogram!(
        "ayaye_process_seconds",
        "Time to fully process one stream entry"
    );
    describe_counter!("ayaye_facts_read", "Facts read off the ledger");
    describe_counter!("ayaye_acts_read", "Acts read off the ledger");
    describe_counter!("ayaye_acts_written", "Outbound acts appended");
    describe_counter!(
        "ayaye_events_skipped",
        "Events classified as no-ops, by reason"
    );
    describe_counter!("ayaye_poison_total", "Undecodable entries dropped");
    describe_counter!(
        "ayaye_handler_failures_total",
        "Handler failures acknowledged without an outbound act"
    );
}
