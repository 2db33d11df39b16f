//! Prometheus metrics for the collectors and job runner.
//!
//! Provides counters for:
//! - Rows deleted per collector and processor
//! - Job steps executed per job kind
//! - Errors per stage (candidate lookup, version selection, processing, jobs)

#[cfg(feature = "prometheus")]
use metrics::counter;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: std::net::SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid listen_addr: {e}")))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled"
        );
    }
    Ok(())
}

/// Record rows deleted by a processor on behalf of a collector.
pub fn record_deletion(collector: &str, processor: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "gc_deletions_total",
            "collector" => collector.to_string(),
            "processor" => processor.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (collector, processor, count);
    }
}

/// Record one executed job step.
pub fn record_job_step(kind: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("gc_job_steps_total", "kind" => kind.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = kind;
    }
}

/// Record an error.
///
/// # Arguments
/// * `stage` - Where it happened (e.g., "find_candidates", "select_versions", "process", "job")
pub fn record_error(stage: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("gc_errors_total", "stage" => stage.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = stage;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
