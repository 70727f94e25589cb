//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! timestamped data model, the device capability traits, configuration and
//! the status/event types the manager publishes.
//! Business crates only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are device-clock nanoseconds (`u64`)
//! - `0` is reserved as the "no data" sentinel
//! - `frame_id` is assigned at ingestion time by the owning buffer, never by the device

mod clock;
mod config;
mod device;
mod error;
mod item;
mod status;

pub use clock::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use item::*;
pub use status::*;

/// Nanoseconds per second
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: u64 = 1_000_000;
