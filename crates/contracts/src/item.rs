//! DataItem - the atomic unit of buffered device data
//!
//! A payload plus its acquisition timestamp, ingestion frame id,
//! validity duration and persistence state.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Timestamped device sample
///
/// Immutable once buffered, except for the persistence flags which are
/// guarded by their own lock so a background writer can mark the item
/// saved while the tick thread reads it.
#[derive(Debug)]
pub struct DataItem {
    /// Acquisition time, device clock (ns)
    timestamp_ns: u64,

    /// Per-source sequence number, assigned by the buffer on append
    frame_id: u64,

    /// How long after `timestamp_ns` the item is still considered current (ns)
    duration_ns: u64,

    /// Device payload
    payload: Payload,

    /// Persistence flags
    persist: Mutex<PersistState>,
}

/// Persistence state of a buffered item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistState {
    /// Item was received while saving was enabled
    pub should_be_saved: bool,
    /// Item was successfully written
    pub is_saved: bool,
    /// File the item was written to
    pub file_name: Option<String>,
}

impl DataItem {
    /// Create a new item; `frame_id` is assigned later by the buffer
    pub fn new(timestamp_ns: u64, duration_ns: u64, payload: Payload) -> Self {
        Self {
            timestamp_ns,
            frame_id: 0,
            duration_ns,
            payload,
            persist: Mutex::new(PersistState::default()),
        }
    }

    #[inline]
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn duration_ns(&self) -> u64 {
        self.duration_ns
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Stamp the ingestion sequence number
    pub fn set_frame_id(&mut self, frame_id: u64) {
        self.frame_id = frame_id;
    }

    /// Tag the item with the source's save policy at ingestion time
    pub fn set_should_be_saved(&self, should_be_saved: bool) {
        let mut state = self.persist.lock();
        state.should_be_saved = should_be_saved;
        state.is_saved = false;
    }

    /// Record a successful write
    pub fn mark_saved(&self, file_name: impl Into<String>) {
        let mut state = self.persist.lock();
        state.is_saved = true;
        state.file_name = Some(file_name.into());
    }

    pub fn should_be_saved(&self) -> bool {
        self.persist.lock().should_be_saved
    }

    pub fn is_saved(&self) -> bool {
        self.persist.lock().is_saved
    }

    pub fn file_name(&self) -> Option<String> {
        self.persist.lock().file_name.clone()
    }

    /// Snapshot of the persistence flags
    pub fn persist_state(&self) -> PersistState {
        self.persist.lock().clone()
    }

    /// Required to be saved and not yet saved
    pub fn needs_saving(&self) -> bool {
        let state = self.persist.lock();
        state.should_be_saved && !state.is_saved
    }

    /// Already persisted, or never required to be
    pub fn is_disposable(&self) -> bool {
        let state = self.persist.lock();
        !state.should_be_saved || state.is_saved
    }
}

/// Device data payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Tracked tool poses
    Tracking(TrackingData),

    /// Video / ultrasound frame
    Frame(FrameData),

    /// Opaque bytes (fallback)
    Raw { data: Bytes },
}

impl Payload {
    /// Payload kind tag
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Tracking(_) => PayloadKind::Tracking,
            Payload::Frame(_) => PayloadKind::Frame,
            Payload::Raw { .. } => PayloadKind::Raw,
        }
    }
}

/// Payload discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Tracking,
    Frame,
    Raw,
}

/// Tracking data: one row-major 4x4 pose per tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    pub tools: BTreeMap<String, [f64; 16]>,
}

impl TrackingData {
    /// Identity pose for every tool
    pub fn identity(tool_names: &[&str]) -> Self {
        let tools = tool_names
            .iter()
            .map(|name| ((*name).to_string(), IDENTITY_POSE))
            .collect();
        Self { tools }
    }
}

/// Row-major 4x4 identity
pub const IDENTITY_POSE: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Frame data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    /// Frame width
    pub width: u32,

    /// Frame height
    pub height: u32,

    /// Channels per pixel
    pub channels: u8,

    /// Raw pixel bytes, row-major
    pub data: Bytes,
}
