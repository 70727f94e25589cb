//! Session statistics.

use std::path::PathBuf;
use std::time::Duration;

use contracts::PlaybackRange;
use observability::TickMetricsAggregator;

/// Statistics from a session run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// "live" or "playback"
    pub mode: String,

    /// Number of sources at the start of the session
    pub sources: usize,

    /// Ticks observed on the event channel
    pub ticks: u64,

    /// Ticks the driver ran (some events may have been dropped)
    pub driver_ticks: u64,

    /// Total duration of the session
    pub duration: Duration,

    /// Session directory written, if recording
    pub recording_dir: Option<PathBuf>,

    /// Range played back, if playing back
    pub playback_range: Option<PlaybackRange>,

    /// Per-source tick statistics
    pub tick_metrics: TickMetricsAggregator,
}

impl SessionStats {
    /// Observed tick rate
    pub fn tick_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.ticks as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Ticks whose event never reached the subscriber
    pub fn dropped_ticks(&self) -> u64 {
        self.driver_ticks.saturating_sub(self.ticks)
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Session Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Mode: {}", self.mode);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Sources: {}", self.sources);
        println!("   ├─ Ticks: {} ({} dropped events)", self.ticks, self.dropped_ticks());
        println!("   └─ Tick rate: {:.2} Hz", self.tick_rate());

        if let Some(ref dir) = self.recording_dir {
            println!("\nRecording");
            println!("   └─ Directory: {}", dir.display());
        }

        if let Some(ref range) = self.playback_range {
            println!("\nPlayback");
            println!("   ├─ Start: {} ns", range.start_ns);
            println!("   ├─ End: {} ns", range.end_ns);
            println!("   └─ Slider: 0..={}", range.slider_max);
        }

        println!("\n{}", self.tick_metrics.summary());
    }
}
