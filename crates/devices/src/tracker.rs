//! Mock optical tracker
//!
//! Produces one pose per configured tool at a fixed rate. The pose
//! translates along x with the sample counter so consumers can see motion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{
    Clock, ContractError, DataItem, DeviceHandler, ItemCallback, Payload, Result, SourceConfig,
    TrackingData, IDENTITY_POSE, NANOS_PER_MILLI,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::MockAcquisition;

pub const MOCK_TRACKER_TYPE: &str = "mock_tracker";

/// Mock tracker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MockTrackerConfig {
    /// Sample rate (Hz)
    pub rate_hz: f64,
    /// Tracked tool names
    pub tools: Vec<String>,
    /// Validity of each sample (ns)
    pub duration_ns: u64,
}

impl Default for MockTrackerConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            tools: vec!["pointer".to_string(), "reference".to_string()],
            duration_ns: 1000 * NANOS_PER_MILLI,
        }
    }
}

impl MockTrackerConfig {
    /// Read `rate_hz`, `tools` (comma separated) and `duration_ms` properties
    pub fn from_source_config(config: &SourceConfig) -> Result<Self> {
        let mut tracker = Self::default();

        if let Some(rate) = config.properties.get("rate_hz") {
            tracker.rate_hz = rate
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r > 0.0)
                .ok_or_else(|| {
                    ContractError::config_validation("properties.rate_hz", "must be positive")
                })?;
        }
        if let Some(tools) = config.properties.get("tools") {
            tracker.tools = tools
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            if tracker.tools.is_empty() {
                return Err(ContractError::config_validation(
                    "properties.tools",
                    "at least one tool is required",
                ));
            }
        }
        if let Some(duration_ms) = config.property::<u64>("duration_ms") {
            tracker.duration_ns = duration_ms.saturating_mul(NANOS_PER_MILLI);
        }

        Ok(tracker)
    }
}

/// Mock tracker handler
pub struct MockTracker {
    config: MockTrackerConfig,
    clock: Arc<dyn Clock>,
    acquisition: MockAcquisition,
    latest: Mutex<Option<TrackingData>>,
    updates: AtomicU64,
}

impl MockTracker {
    pub fn new(config: MockTrackerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            acquisition: MockAcquisition::new(),
            latest: Mutex::new(None),
            updates: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MockTrackerConfig {
        &self.config
    }

    /// Pose most recently applied by `update`
    pub fn latest(&self) -> Option<TrackingData> {
        self.latest.lock().clone()
    }

    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Pose for sample `n`: identity translated by n millimetres along x
    pub fn make_sample(tools: &[String], sample: u64) -> TrackingData {
        let mut pose = IDENTITY_POSE;
        pose[3] = sample as f64;
        TrackingData {
            tools: tools.iter().map(|t| (t.clone(), pose)).collect(),
        }
    }
}

impl DeviceHandler for MockTracker {
    fn device_type(&self) -> &str {
        MOCK_TRACKER_TYPE
    }

    fn can_handle(&self, payload: &Payload) -> bool {
        matches!(payload, Payload::Tracking(_))
    }

    fn update(&self, item: &DataItem) -> Result<bool> {
        let Payload::Tracking(tracking) = item.payload() else {
            return Err(ContractError::device(
                MOCK_TRACKER_TYPE,
                "expected a tracking payload",
            ));
        };
        trace!(tools = tracking.tools.len(), timestamp_ns = item.timestamp_ns(), "tracker update");
        *self.latest.lock() = Some(tracking.clone());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn listen(&self, callback: ItemCallback) {
        let clock = Arc::clone(&self.clock);
        let tools = self.config.tools.clone();
        let duration_ns = self.config.duration_ns;
        self.acquisition.start(
            MOCK_TRACKER_TYPE,
            self.config.rate_hz,
            Box::new(move |sample| {
                DataItem::new(
                    clock.now_ns(),
                    duration_ns,
                    Payload::Tracking(Self::make_sample(&tools, sample)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemClock;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_config_from_properties() {
        let mut source = SourceConfig::default();
        source.properties.insert("rate_hz".into(), "120".into());
        source.properties.insert("tools".into(), "pointer, needle".into());
        source.properties.insert("duration_ms".into(), "50".into());

        let config = MockTrackerConfig::from_source_config(&source).unwrap();
        assert_eq!(config.rate_hz, 120.0);
        assert_eq!(config.tools, vec!["pointer".to_string(), "needle".to_string()]);
        assert_eq!(config.duration_ns, 50 * NANOS_PER_MILLI);
    }

    #[test]
    fn test_config_rejects_bad_rate() {
        let mut source = SourceConfig::default();
        source.properties.insert("rate_hz".into(), "-1".into());
        assert!(MockTrackerConfig::from_source_config(&source).is_err());
    }

    #[test]
    fn test_listen_produces_items() {
        let tracker = MockTracker::new(
            MockTrackerConfig {
                rate_hz: 200.0,
                ..Default::default()
            },
            Arc::new(SystemClock),
        );

        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        tracker.listen(Arc::new(move |item| {
            assert!(item.timestamp_ns() > 0);
            assert!(matches!(item.payload(), Payload::Tracking(_)));
            count_clone.fetch_add(1, Ordering::Relaxed);
        }));
        assert!(tracker.is_listening());

        thread::sleep(Duration::from_millis(50));
        tracker.stop();

        assert!(count.load(Ordering::Relaxed) > 0);
        assert!(!tracker.is_listening());
    }

    #[test]
    fn test_idempotent_listen() {
        let tracker = MockTracker::new(MockTrackerConfig::default(), Arc::new(SystemClock));
        let count = Arc::new(AtomicU64::new(0));
        let first = Arc::clone(&count);
        let second = Arc::clone(&count);

        tracker.listen(Arc::new(move |_| {
            first.fetch_add(1, Ordering::Relaxed);
        }));
        tracker.listen(Arc::new(move |_| {
            second.fetch_add(1_000_000, Ordering::Relaxed);
        }));

        thread::sleep(Duration::from_millis(30));
        tracker.stop();
        assert!(count.load(Ordering::Relaxed) < 1_000_000);
    }

    #[test]
    fn test_update_stores_pose() {
        let tracker = MockTracker::new(MockTrackerConfig::default(), Arc::new(SystemClock));
        let tools = vec!["pointer".to_string()];
        let item = DataItem::new(10, 10, Payload::Tracking(MockTracker::make_sample(&tools, 7)));

        assert!(tracker.update(&item).unwrap());
        assert_eq!(tracker.update_count(), 1);
        assert_eq!(tracker.latest().unwrap().tools["pointer"][3], 7.0);
    }

    #[test]
    fn test_rejects_frame_payload() {
        let tracker = MockTracker::new(MockTrackerConfig::default(), Arc::new(SystemClock));
        assert!(!tracker.can_handle(&Payload::Raw { data: Default::default() }));
    }
}
