//! Source and manager configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::Validate;

use crate::NANOS_PER_MILLI;

/// Default manager tick rate (Hz)
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 20;

/// Default slider resolution, a quarter of the 32-bit signed range
pub const DEFAULT_SLIDER_RESOLUTION: u32 = (i32::MAX / 4) as u32;

/// Per-source configuration blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SourceConfig {
    /// Row label override (defaults to the factory display name)
    pub name: Option<String>,

    /// Maximum acceptable |requested - actual| (milliseconds)
    #[validate(range(min = 1))]
    pub tolerance_ms: u64,

    /// Nanosecond tolerance, overrides `tolerance_ms` when set
    #[validate(range(min = 1))]
    pub tolerance_ns: Option<u64>,

    /// Save every received item, rather than only the displayed ones
    pub save_on_receipt: bool,

    /// Move saving off the tick thread onto a worker
    pub save_in_background: bool,

    /// Background worker period (milliseconds)
    #[validate(range(min = 1))]
    pub background_save_interval_ms: u64,

    /// Device-specific properties
    pub properties: BTreeMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: None,
            tolerance_ms: 1000,
            tolerance_ns: None,
            save_on_receipt: true,
            save_in_background: false,
            background_save_interval_ms: 100,
            properties: BTreeMap::new(),
        }
    }
}

impl SourceConfig {
    /// Tolerance in nanoseconds
    pub fn tolerance_ns(&self) -> u64 {
        self.tolerance_ns
            .unwrap_or_else(|| self.tolerance_ms.saturating_mul(NANOS_PER_MILLI))
    }

    /// Parse a device property
    pub fn property<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.properties.get(key).and_then(|v| v.parse().ok())
    }
}

/// One source to add at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SourceEntryConfig {
    /// Factory display name
    #[validate(length(min = 1))]
    pub factory: String,

    /// Configuration handed to the factory
    #[serde(default)]
    #[validate(nested)]
    pub config: SourceConfig,
}

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ManagerConfig {
    /// Tick rate (Hz), also the render-update rate
    #[validate(range(min = 1, max = 1000))]
    pub frames_per_second: u32,

    /// Root directory that recording sessions are created in
    pub recording_root: Option<PathBuf>,

    /// Number of slider units the whole playback range is mapped onto
    #[validate(range(min = 1))]
    pub slider_resolution: u32,

    /// Capacity of the event channel
    #[validate(range(min = 1))]
    pub event_queue_capacity: usize,

    /// Sources added at startup, in row order
    #[validate(nested)]
    pub sources: Vec<SourceEntryConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            recording_root: None,
            slider_resolution: DEFAULT_SLIDER_RESOLUTION,
            event_queue_capacity: 256,
            sources: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Tick period in nanoseconds
    pub fn tick_period_ns(&self) -> u64 {
        crate::NANOS_PER_SECOND / u64::from(self.frames_per_second.max(1))
    }
}
