//! Factories for the mock device families

use std::sync::Arc;

use contracts::{Clock, DataSourceFactory, DeviceHandler, Result, SourceConfig};

use crate::frame_grabber::{MockFrameGrabber, MockFrameGrabberConfig, MOCK_FRAME_GRABBER_TYPE};
use crate::tracker::{MockTracker, MockTrackerConfig, MOCK_TRACKER_TYPE};

/// Builds [`MockTracker`] handlers
pub struct MockTrackerFactory {
    clock: Arc<dyn Clock>,
}

impl MockTrackerFactory {
    pub const DISPLAY_NAME: &'static str = "Mock Tracker";

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl DataSourceFactory for MockTrackerFactory {
    fn display_name(&self) -> &str {
        Self::DISPLAY_NAME
    }

    fn device_type(&self) -> &str {
        MOCK_TRACKER_TYPE
    }

    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn DeviceHandler>> {
        let tracker_config = MockTrackerConfig::from_source_config(config)?;
        Ok(Arc::new(MockTracker::new(
            tracker_config,
            Arc::clone(&self.clock),
        )))
    }
}

/// Builds [`MockFrameGrabber`] handlers
pub struct MockFrameGrabberFactory {
    clock: Arc<dyn Clock>,
}

impl MockFrameGrabberFactory {
    pub const DISPLAY_NAME: &'static str = "Mock Frame Grabber";

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl DataSourceFactory for MockFrameGrabberFactory {
    fn display_name(&self) -> &str {
        Self::DISPLAY_NAME
    }

    fn device_type(&self) -> &str {
        MOCK_FRAME_GRABBER_TYPE
    }

    /// Frame size has to be chosen before the grabber starts
    fn needs_startup_config(&self) -> bool {
        true
    }

    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn DeviceHandler>> {
        let grabber_config = MockFrameGrabberConfig::from_source_config(config)?;
        Ok(Arc::new(MockFrameGrabber::new(
            grabber_config,
            Arc::clone(&self.clock),
        )))
    }
}

/// Every built-in factory, in display order
pub fn default_factories(clock: Arc<dyn Clock>) -> Vec<Arc<dyn DataSourceFactory>> {
    vec![
        Arc::new(MockTrackerFactory::new(Arc::clone(&clock))),
        Arc::new(MockFrameGrabberFactory::new(clock)),
    ]
}
