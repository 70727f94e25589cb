//! Status and event contracts
//!
//! What the manager publishes to its external GUI / telemetry collaborator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Manager operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerMode {
    /// No sources, timer off
    #[default]
    Idle,
    /// Requested time follows the device clock
    Live,
    /// Requested time is set externally by scrubbing a recording
    Playback,
}

/// Per-source status, emitted once per tick for every source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    /// Row index (insertion order)
    pub row: usize,

    /// Row label
    pub name: String,

    /// Device type
    pub device_type: String,

    /// Estimated frame rate (Hz)
    pub frame_rate_hz: f64,

    /// Now minus the resolved item's timestamp (milliseconds)
    pub lag_ms: f64,

    /// Resolved item was within tolerance this tick
    pub is_current: bool,

    /// Resolved item's timestamp, 0 if none
    pub actual_timestamp_ns: u64,

    /// Items currently buffered
    pub buffer_len: usize,

    /// Source is frozen (buffering but not updated)
    pub frozen: bool,
}

/// Playback slider parameters returned by `start_playback`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRange {
    /// Earliest first timestamp across all recorded sources
    pub start_ns: u64,
    /// Latest last timestamp across all recorded sources
    pub end_ns: u64,
    /// Slider maximum
    pub slider_max: i32,
    /// Slider single step (one tick)
    pub slider_single_step: i32,
    /// Slider page step (about one second)
    pub slider_page_step: i32,
    /// Initial slider value
    pub slider_value: i32,
}

/// Typed event from the manager to its external collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    /// Every source has been asked to process `requested_ns`
    UpdateFinished {
        requested_ns: u64,
        statuses: Vec<SourceStatus>,
    },

    /// One render-update pulse per tick
    RenderRequested,

    /// Current time, raw and human readable
    TimerUpdated { raw_ns: u64, human: String },

    /// Auto-advancing playback moved the slider
    PlaybackAdvanced { slider_value: i32 },

    /// Recording session started
    RecordingStarted { directory: PathBuf },

    /// Recording session stopped
    RecordingStopped,

    /// Free-form status message
    BroadcastStatus { message: String },
}
