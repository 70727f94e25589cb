//! # Source Manager
//!
//! Owns the set of data sources and drives them through the three manager
//! modes:
//! - **Live**: every tick asks each source for its item nearest to "now"
//! - **Recording**: live mode plus per-item persistence into a session
//!   directory described by `descriptor.toml`
//! - **Playback**: sources are rebuilt from a session directory and the tick
//!   asks for a scrub time mapped from a bounded slider
//!
//! ## Usage
//!
//! ```ignore
//! use source_manager::{DataSourceManager, FactoryRegistry, ManagerRunner};
//!
//! let registry = FactoryRegistry::new(devices::default_factories(clock.clone()))?;
//! let manager = DataSourceManager::from_config(registry, clock, config)?;
//! let manager = Arc::new(parking_lot::Mutex::new(manager));
//!
//! let runner = ManagerRunner::spawn(Arc::clone(&manager));
//! manager.lock().start_recording(None)?;
//! ```

mod manager;
mod registry;
mod runner;
mod session;
mod slider;

pub use manager::{format_timestamp, DataSourceManager, MAX_FRAMES_PER_SECOND};
pub use registry::FactoryRegistry;
pub use runner::{ManagerRunner, SharedManager};
pub use session::{
    default_recording_root, session_directory_name, source_directory_name, Descriptor,
    DescriptorEntry, PlaybackSession, RecordingSession, DESCRIPTOR_FILE_NAME,
    DESCRIPTOR_VERSION, RECORDING_ROOT_ENV,
};
pub use slider::SliderMapping;
