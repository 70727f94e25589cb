//! Data source manager metrics
//!
//! Per-tick metrics are recorded from the `SourceStatus` list the manager
//! publishes. Per-item counters (saves, stale lookups, cleaning) are recorded
//! by the sources themselves.

use std::collections::BTreeMap;

use contracts::SourceStatus;
use metrics::{counter, gauge, histogram};

/// Record the outcome of one manager tick
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_tick_metrics;
///
/// let statuses = manager.on_tick();
/// record_tick_metrics(&statuses);
/// ```
pub fn record_tick_metrics(statuses: &[SourceStatus]) {
    counter!("igi_syncer_ticks_total").increment(1);
    gauge!("igi_syncer_sources").set(statuses.len() as f64);

    let current = statuses.iter().filter(|s| s.is_current).count();
    gauge!("igi_syncer_sources_current").set(current as f64);

    for status in statuses {
        gauge!(
            "igi_syncer_source_frame_rate_hz",
            "source" => status.name.clone()
        )
        .set(status.frame_rate_hz);

        histogram!(
            "igi_syncer_source_lag_ms",
            "source" => status.name.clone()
        )
        .record(status.lag_ms);

        record_buffer_depth(&status.name, status.buffer_len);
    }
}

/// Record a resolution that fell outside tolerance
pub fn record_stale(source: &str) {
    counter!(
        "igi_syncer_source_stale_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record one item written to disk
pub fn record_item_saved(source: &str) {
    counter!(
        "igi_syncer_items_saved_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record one failed save attempt
pub fn record_persist_failure(source: &str) {
    counter!(
        "igi_syncer_persist_failures_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record items removed from the head of a buffer
pub fn record_buffer_cleaned(source: &str, removed: usize) {
    counter!(
        "igi_syncer_buffer_cleaned_total",
        "source" => source.to_string()
    )
    .increment(removed as u64);
}

/// Record buffer depth
pub fn record_buffer_depth(source: &str, depth: usize) {
    gauge!(
        "igi_syncer_buffer_depth",
        "source" => source.to_string()
    )
    .set(depth as f64);
}

/// Per-source tick statistics
#[derive(Debug, Clone, Default)]
pub struct SourceTickStats {
    /// Ticks where the source resolved within tolerance
    pub current_ticks: u64,
    /// Ticks where the source had no current item
    pub stale_ticks: u64,
    /// Lag statistics (ms)
    pub lag_ms: RunningStats,
    /// Frame rate statistics (Hz)
    pub frame_rate_hz: RunningStats,
}

/// Tick metrics aggregator
///
/// Aggregates in memory for an end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct TickMetricsAggregator {
    /// Total ticks
    pub total_ticks: u64,

    /// Ticks where every source was current
    pub fully_current_ticks: u64,

    /// Per-source statistics
    pub sources: BTreeMap<String, SourceTickStats>,
}

impl TickMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's statuses in
    pub fn update(&mut self, statuses: &[SourceStatus]) {
        self.total_ticks += 1;
        if !statuses.is_empty() && statuses.iter().all(|s| s.is_current) {
            self.fully_current_ticks += 1;
        }

        for status in statuses {
            let stats = self.sources.entry(status.name.clone()).or_default();
            if status.is_current {
                stats.current_ticks += 1;
                stats.lag_ms.push(status.lag_ms);
            } else {
                stats.stale_ticks += 1;
            }
            if status.frame_rate_hz > 0.0 {
                stats.frame_rate_hz.push(status.frame_rate_hz);
            }
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_ticks: self.total_ticks,
            fully_current_ticks: self.fully_current_ticks,
            current_rate: if self.total_ticks > 0 {
                self.fully_current_ticks as f64 / self.total_ticks as f64 * 100.0
            } else {
                0.0
            },
            sources: self
                .sources
                .iter()
                .map(|(name, stats)| {
                    (
                        name.clone(),
                        SourceSummary {
                            current_ticks: stats.current_ticks,
                            stale_ticks: stats.stale_ticks,
                            lag_ms: StatsSummary::from(&stats.lag_ms),
                            frame_rate_hz: StatsSummary::from(&stats.frame_rate_hz),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-source summary
#[derive(Debug, Clone, Default)]
pub struct SourceSummary {
    pub current_ticks: u64,
    pub stale_ticks: u64,
    pub lag_ms: StatsSummary,
    pub frame_rate_hz: StatsSummary,
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub fully_current_ticks: u64,
    pub current_rate: f64,
    pub sources: BTreeMap<String, SourceSummary>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Tick Metrics Summary ===")?;
        writeln!(f, "Total ticks: {}", self.total_ticks)?;
        writeln!(
            f,
            "Ticks with every source current: {} ({:.2}%)",
            self.fully_current_ticks, self.current_rate
        )?;

        for (name, source) in &self.sources {
            writeln!(f, "[{}]", name)?;
            writeln!(
                f,
                "  current/stale ticks: {}/{}",
                source.current_ticks, source.stale_ticks
            )?;
            writeln!(f, "  lag (ms): {}", source.lag_ms)?;
            writeln!(f, "  frame rate (Hz): {}", source.frame_rate_hz)?;
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
