//! # Sync Engine
//!
//! Per-source buffering and time resolution for the data source manager.
//!
//! Responsibilities:
//! - ordered per-source buffers with a cached nearest-timestamp cursor
//! - tolerance-gated resolution of a requested time to one item
//! - frame-rate estimation and bounded buffer cleaning
//! - per-item persistence (inline or on a background worker)
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::DataSource;
//!
//! let source = Arc::new(DataSource::new("Mock Tracker-0", handler, &config));
//! source.start_acquisition();
//!
//! // On every tick
//! let current = source.process_data(requested_ns);
//! source.update_frame_rate();
//! source.clean_buffer();
//! ```

mod buffer;
mod data_source;
mod persist;
mod saver;

pub use buffer::SourceBuffer;
pub use data_source::{DataSource, Resolution};
pub use persist::{JsonRecorder, RecordedItem};
pub use saver::BackgroundSaver;
