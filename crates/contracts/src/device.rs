//! Device capability traits
//!
//! A device family plugs into the ingestion layer by implementing
//! `DeviceHandler` (what to do with a resolved item) and registering a
//! `DataSourceFactory` (how to build a handler from configuration).
//! The manager treats every device family through these traits only.

use std::path::Path;
use std::sync::Arc;

use crate::{DataItem, Payload, Result, SourceConfig};

/// Item callback type
///
/// A device's acquisition side sends every new sample through this callback.
/// Uses `Arc` so the callback can be moved onto the device's own thread.
pub type ItemCallback = Arc<dyn Fn(DataItem) + Send + Sync>;

/// Device family capability interface
///
/// # Design Principles
///
/// 1. **Decoupling**: acquisition (`listen`) is independent from consumption (`update`)
/// 2. **Unified Interface**: live and playback sources use the same handler
/// 3. **Callback Pattern**: acquisition pushes items through `ItemCallback`
pub trait DeviceHandler: Send + Sync {
    /// Device type name, written to the recording descriptor
    fn device_type(&self) -> &str;

    /// Whether this device family understands the payload
    fn can_handle(&self, payload: &Payload) -> bool {
        let _ = payload;
        true
    }

    /// Refresh whatever state the device owns for the resolved item
    ///
    /// Called from the manager's tick. Errors and panics are isolated to
    /// this source.
    fn update(&self, item: &DataItem) -> Result<bool>;

    /// Device-specific persistence, `None` uses the default JSON layout
    fn recorder(&self) -> Option<&dyn ItemRecorder> {
        None
    }

    /// Start producing items through `callback`
    ///
    /// Repeated calls must be idempotent. Devices without their own
    /// acquisition (e.g. playback-only) keep the default no-op.
    fn listen(&self, callback: ItemCallback) {
        let _ = callback;
    }

    /// Stop producing items
    fn stop(&self) {}

    /// Check if currently producing items
    fn is_listening(&self) -> bool {
        false
    }
}

/// Device-specific item persistence
pub trait ItemRecorder: Send + Sync {
    /// Write one item into `dir`, returning the file name written
    fn save(&self, item: &DataItem, dir: &Path) -> Result<String>;

    /// Read back every item written into `dir`, in timestamp order
    fn load(&self, dir: &Path) -> Result<Vec<DataItem>>;
}

/// Pluggable construction of device handlers
pub trait DataSourceFactory: Send + Sync {
    /// Name shown to the user, unique across the registry
    fn display_name(&self) -> &str;

    /// Device type this factory produces (descriptor value)
    fn device_type(&self) -> &str;

    /// Whether the device needs configuring before it can start (e.g. a port)
    fn needs_startup_config(&self) -> bool {
        false
    }

    /// Build a handler from a configuration blob
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn DeviceHandler>>;
}
