//! Mock video frame grabber

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    Clock, ContractError, DataItem, DeviceHandler, FrameData, ItemCallback, Payload, Result,
    SourceConfig, NANOS_PER_SECOND,
};
use parking_lot::Mutex;

use crate::MockAcquisition;

pub const MOCK_FRAME_GRABBER_TYPE: &str = "mock_frame_grabber";

/// Mock frame grabber configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MockFrameGrabberConfig {
    /// Frame rate (Hz)
    pub rate_hz: f64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl Default for MockFrameGrabberConfig {
    fn default() -> Self {
        Self {
            rate_hz: 25.0,
            width: 64,
            height: 48,
            channels: 3,
        }
    }
}

impl MockFrameGrabberConfig {
    /// Read `rate_hz`, `width`, `height` and `channels` properties
    pub fn from_source_config(config: &SourceConfig) -> Result<Self> {
        let mut grabber = Self::default();

        if let Some(rate) = config.properties.get("rate_hz") {
            grabber.rate_hz = rate
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r > 0.0)
                .ok_or_else(|| {
                    ContractError::config_validation("properties.rate_hz", "must be positive")
                })?;
        }
        if let Some(width) = config.property::<u32>("width") {
            grabber.width = width;
        }
        if let Some(height) = config.property::<u32>("height") {
            grabber.height = height;
        }
        if let Some(channels) = config.property::<u8>("channels") {
            grabber.channels = channels;
        }
        if grabber.width == 0 || grabber.height == 0 || grabber.channels == 0 {
            return Err(ContractError::config_validation(
                "properties",
                "frame dimensions must be non-zero",
            ));
        }

        Ok(grabber)
    }

    /// A frame stays current for one frame period
    pub fn frame_duration_ns(&self) -> u64 {
        (NANOS_PER_SECOND as f64 / self.rate_hz) as u64
    }
}

/// Mock frame grabber handler
pub struct MockFrameGrabber {
    config: MockFrameGrabberConfig,
    clock: Arc<dyn Clock>,
    acquisition: MockAcquisition,
    last_frame_id: Mutex<Option<u64>>,
    updates: AtomicU64,
}

impl MockFrameGrabber {
    pub fn new(config: MockFrameGrabberConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            acquisition: MockAcquisition::new(),
            last_frame_id: Mutex::new(None),
            updates: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MockFrameGrabberConfig {
        &self.config
    }

    /// Frame id most recently displayed
    pub fn last_frame_id(&self) -> Option<u64> {
        *self.last_frame_id.lock()
    }

    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Solid-colour frame whose intensity cycles with the sample counter
    pub fn make_frame(config: &MockFrameGrabberConfig, sample: u64) -> FrameData {
        let size = config.width as usize * config.height as usize * config.channels as usize;
        FrameData {
            width: config.width,
            height: config.height,
            channels: config.channels,
            data: Bytes::from(vec![(sample % 256) as u8; size]),
        }
    }
}

impl DeviceHandler for MockFrameGrabber {
    fn device_type(&self) -> &str {
        MOCK_FRAME_GRABBER_TYPE
    }

    fn can_handle(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Frame(_))
    }

    fn update(&self, item: &DataItem) -> Result<bool> {
        let Payload::Frame(frame) = item.payload() else {
            return Err(ContractError::device(
                MOCK_FRAME_GRABBER_TYPE,
                "expected a frame payload",
            ));
        };

        let expected = frame.width as usize * frame.height as usize * frame.channels as usize;
        if frame.data.len() != expected {
            return Err(ContractError::device(
                MOCK_FRAME_GRABBER_TYPE,
                format!("frame holds {} bytes, expected {expected}", frame.data.len()),
            ));
        }

        *self.last_frame_id.lock() = Some(item.frame_id());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn listen(&self, callback: ItemCallback) {
        let clock = Arc::clone(&self.clock);
        let config = self.config.clone();
        let duration_ns = config.frame_duration_ns();
        self.acquisition.start(
            MOCK_FRAME_GRABBER_TYPE,
            self.config.rate_hz,
            Box::new(move |sample| {
                DataItem::new(
                    clock.now_ns(),
                    duration_ns,
                    Payload::Frame(Self::make_frame(&config, sample)),
                )
            }),
            callback,
        );
    }

    fn stop(&self) {
        self.acquisition.stop();
    }

    fn is_listening(&self) -> bool {
        self.acquisition.is_listening()
    }
}
