//! # Observability
//!
//! Tracing and Prometheus metrics for the data source manager.
//!
//! ## Features
//!
//! - Tracing initialization (JSON / Pretty / Compact)
//! - Prometheus metrics export
//! - Per-tick and per-source metric recording with an in-memory aggregator
//!
//! ## Usage
//!
//! ```ignore
//! use observability::{init_with_config, metrics, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::default())?;
//!
//! let statuses = manager.on_tick();
//! metrics::record_tick_metrics(&statuses);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_buffer_cleaned, record_buffer_depth, record_item_saved, record_persist_failure,
    record_stale, record_tick_metrics, MetricsSummary, RunningStats, SourceSummary, StatsSummary,
    TickMetricsAggregator,
};

/// Initialize tracing with defaults
///
/// - Tracing: JSON, honours RUST_LOG
/// - Prometheus: disabled
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Default log level when RUST_LOG is unset
    pub default_log_level: String,
    /// Let RUST_LOG override `default_log_level`
    pub honour_rust_log: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
            honour_rust_log: true,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Human readable, multi-line
    Pretty,
    /// Compact single line
    Compact,
}

impl ObservabilityConfig {
    /// Level filter: RUST_LOG when honoured and set, else the default level
    pub fn env_filter(&self) -> EnvFilter {
        let from_env = self
            .honour_rust_log
            .then(|| EnvFilter::try_from_default_env().ok())
            .flatten();
        from_env.unwrap_or_else(|| EnvFilter::new(&self.default_log_level))
    }
}

/// Initialize with a custom configuration
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(config.env_filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus recorder
///
/// For binaries that set up their own tracing subscriber.
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(port)
}

fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
