//! # Devices
//!
//! Built-in device families: a mock tracker and a mock frame grabber, each
//! with its `DataSourceFactory`. They generate data on their own threads
//! and are used for development and tests without real hardware.

mod acquisition;
mod factory;
mod frame_grabber;
mod tracker;

pub use acquisition::{ItemGenerator, MockAcquisition};
pub use factory::{default_factories, MockFrameGrabberFactory, MockTrackerFactory};
pub use frame_grabber::{MockFrameGrabber, MockFrameGrabberConfig, MOCK_FRAME_GRABBER_TYPE};
pub use tracker::{MockTracker, MockTrackerConfig, MOCK_TRACKER_TYPE};
