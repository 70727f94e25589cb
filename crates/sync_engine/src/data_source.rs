//! DataSource - one device's buffered stream plus its save policy.
//!
//! Items arrive on the device's thread via [`DataSource::add_data`] and are
//! consumed on the tick thread via [`DataSource::process_data`]. Persistence
//! runs inline (save on receipt / on display) or on a [`BackgroundSaver`].

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, DataItem, DeviceHandler, ItemCallback, ItemRecorder, Result, SourceConfig,
    NANOS_PER_MILLI,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::persist::JsonRecorder;
use crate::saver::BackgroundSaver;
use crate::SourceBuffer;

/// Result of resolving a requested time against a source
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Time that was asked for
    pub requested_ns: u64,
    /// Timestamp of the item found, 0 if none
    pub actual_ns: u64,
    /// The item found
    pub item: Option<Arc<DataItem>>,
}

impl Resolution {
    /// |requested - actual|
    pub fn delta_ns(&self) -> u64 {
        self.requested_ns.abs_diff(self.actual_ns)
    }

    pub fn has_data(&self) -> bool {
        self.item.is_some()
    }
}

#[derive(Debug, Default)]
struct SourceState {
    frame_rate_hz: f64,
    last_resolution: Option<Resolution>,
    recording_dir: Option<PathBuf>,
}

/// One device's buffered stream
pub struct DataSource {
    name: String,
    handler: Arc<dyn DeviceHandler>,
    buffer: SourceBuffer,
    tolerance_ns: u64,
    background_interval: Duration,

    saving_enabled: AtomicBool,
    save_on_receipt: AtomicBool,
    save_in_background: AtomicBool,
    playing_back: AtomicBool,

    /// Held across "read saving flag, tag, append" and across flag changes
    ingest: Mutex<()>,
    state: Mutex<SourceState>,
    saver: Mutex<Option<BackgroundSaver>>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("device_type", &self.handler.device_type())
            .field("buffer", &self.buffer)
            .field("tolerance_ns", &self.tolerance_ns)
            .finish()
    }
}

impl DataSource {
    /// Create a source around a device handler
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn DeviceHandler>,
        config: &SourceConfig,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            buffer: SourceBuffer::new(),
            tolerance_ns: config.tolerance_ns(),
            background_interval: Duration::from_millis(config.background_save_interval_ms.max(1)),
            saving_enabled: AtomicBool::new(false),
            save_on_receipt: AtomicBool::new(config.save_on_receipt),
            save_in_background: AtomicBool::new(config.save_in_background),
            playing_back: AtomicBool::new(false),
            ingest: Mutex::new(()),
            state: Mutex::new(SourceState::default()),
            saver: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> &str {
        self.handler.device_type()
    }

    pub fn handler(&self) -> &Arc<dyn DeviceHandler> {
        &self.handler
    }

    pub fn buffer(&self) -> &SourceBuffer {
        &self.buffer
    }

    pub fn tolerance_ns(&self) -> u64 {
        self.tolerance_ns
    }

    pub fn is_saving(&self) -> bool {
        self.saving_enabled.load(Ordering::SeqCst)
    }

    pub fn save_on_receipt(&self) -> bool {
        self.save_on_receipt.load(Ordering::SeqCst)
    }

    pub fn set_save_on_receipt(&self, enabled: bool) {
        self.save_on_receipt.store(enabled, Ordering::SeqCst);
    }

    pub fn save_in_background(&self) -> bool {
        self.save_in_background.load(Ordering::SeqCst)
    }

    /// Takes effect at the next `start_recording`
    pub fn set_save_in_background(&self, enabled: bool) {
        self.save_in_background.store(enabled, Ordering::SeqCst);
    }

    pub fn is_playing_back(&self) -> bool {
        self.playing_back.load(Ordering::SeqCst)
    }

    /// Ingest a new item from the device
    ///
    /// Returns `Ok(false)` when the item was stored but an inline save
    /// failed, or when the source is playing back and live data is ignored.
    ///
    /// # Errors
    /// `InvalidArgument` for a payload the device cannot handle or an item
    /// without a timestamp. The buffer is left untouched.
    pub fn add_data(&self, item: DataItem) -> Result<bool> {
        if !self.handler.can_handle(item.payload()) {
            return Err(ContractError::invalid_argument(format!(
                "source '{}' cannot handle {:?} payloads",
                self.name,
                item.payload().kind()
            )));
        }

        if self.is_playing_back() {
            debug!(source = %self.name, "ignoring live item during playback");
            return Ok(false);
        }

        let (saving, item) = {
            let _ingest = self.ingest.lock();
            let saving = self.is_saving();
            item.set_should_be_saved(saving);
            (saving, self.buffer.append(item)?)
        };

        if saving
            && !self.save_in_background()
            && self.save_on_receipt()
            && item.needs_saving()
        {
            return Ok(self.save_item(&item));
        }

        Ok(true)
    }

    /// Find the item closest to `requested_ns` and remember the result
    pub fn request_data(&self, requested_ns: u64) -> Resolution {
        let item = self.buffer.nearest_to(requested_ns);
        let resolution = Resolution {
            requested_ns,
            actual_ns: item.as_ref().map_or(0, |i| i.timestamp_ns()),
            item,
        };
        self.state.lock().last_resolution = Some(resolution.clone());
        resolution
    }

    /// Whether a resolution is close enough to count as current
    ///
    /// Both the source tolerance and the item's own validity duration bound
    /// the delta.
    pub fn is_current_within_tolerance(&self, resolution: &Resolution) -> bool {
        let Some(item) = resolution.item.as_ref() else {
            return false;
        };
        let delta = resolution.delta_ns();
        delta < self.tolerance_ns && delta < item.duration_ns()
    }

    /// Resolve `requested_ns` and let the device update from the result
    ///
    /// Never fails: a stale resolution, a device error or a device panic
    /// all report `false` for this source only.
    #[instrument(name = "data_source_process", skip(self), fields(source = %self.name))]
    pub fn process_data(&self, requested_ns: u64) -> bool {
        let resolution = self.request_data(requested_ns);
        let Some(item) = resolution.item.as_ref() else {
            return false;
        };

        if !self.is_current_within_tolerance(&resolution) {
            observability::record_stale(&self.name);
            debug!(
                requested_ns,
                actual_ns = resolution.actual_ns,
                "resolved item outside tolerance"
            );
            return false;
        }

        if self.is_saving()
            && !self.save_in_background()
            && !self.save_on_receipt()
            && item.needs_saving()
        {
            self.save_item(item);
        }

        let handler = Arc::clone(&self.handler);
        match panic::catch_unwind(AssertUnwindSafe(|| handler.update(item))) {
            Ok(Ok(updated)) => updated,
            Ok(Err(e)) => {
                error!(error = %e, "device update failed");
                false
            }
            Err(_) => {
                error!("device update panicked");
                false
            }
        }
    }

    /// Re-estimate the frame rate, keeping the previous value when the
    /// estimate is not possible yet
    pub fn update_frame_rate(&self) -> f64 {
        let mut state = self.state.lock();
        if let Some(rate) = self.buffer.estimate_frame_rate() {
            state.frame_rate_hz = rate;
        }
        state.frame_rate_hz
    }

    pub fn frame_rate_hz(&self) -> f64 {
        self.state.lock().frame_rate_hz
    }

    /// Drop old items, keeping about two frames' worth
    pub fn clean_buffer(&self) -> usize {
        let min_retain = ((self.frame_rate_hz() * 2.0).ceil() as usize).max(1);
        let removed = self.buffer.clean(min_retain);
        if removed > 0 {
            observability::record_buffer_cleaned(&self.name, removed);
        }
        removed
    }

    /// Drop every buffered item
    pub fn clear_buffer(&self) -> usize {
        self.state.lock().last_resolution = None;
        self.buffer.clear()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Head timestamp, 0 if empty
    pub fn first_timestamp(&self) -> u64 {
        self.buffer.first_timestamp().unwrap_or(0)
    }

    /// Tail timestamp, 0 if empty
    pub fn last_timestamp(&self) -> u64 {
        self.buffer.last_timestamp().unwrap_or(0)
    }

    pub fn last_resolution(&self) -> Option<Resolution> {
        self.state.lock().last_resolution.clone()
    }

    /// `now_ns` minus the last resolved timestamp (milliseconds)
    pub fn current_time_lag_ms(&self, now_ns: u64) -> f64 {
        let state = self.state.lock();
        match state.last_resolution.as_ref() {
            Some(resolution) if resolution.actual_ns > 0 => {
                (now_ns as f64 - resolution.actual_ns as f64) / NANOS_PER_MILLI as f64
            }
            _ => 0.0,
        }
    }

    fn with_recorder<T>(&self, f: impl FnOnce(&dyn ItemRecorder) -> T) -> T {
        match self.handler.recorder() {
            Some(recorder) => f(recorder),
            None => f(&JsonRecorder),
        }
    }

    /// Write one item to the recording directory
    ///
    /// Failures are logged and counted; the item stays unsaved.
    pub fn save_item(&self, item: &DataItem) -> bool {
        let Some(dir) = self.state.lock().recording_dir.clone() else {
            warn!(source = %self.name, "save requested without a recording directory");
            observability::record_persist_failure(&self.name);
            return false;
        };

        match self.with_recorder(|recorder| recorder.save(item, &dir)) {
            Ok(file_name) => {
                item.mark_saved(file_name);
                observability::record_item_saved(&self.name);
                true
            }
            Err(e) => {
                let err = ContractError::persist_failure(&self.name, e.to_string());
                warn!(error = %err, timestamp_ns = item.timestamp_ns(), "item not saved");
                observability::record_persist_failure(&self.name);
                false
            }
        }
    }

    /// Save every pending item, returns how many were written
    ///
    /// The buffer lock is held only while collecting the pending set.
    pub fn save_buffer(&self) -> usize {
        self.buffer
            .pending_save()
            .iter()
            .filter(|item| self.save_item(item))
            .count()
    }

    /// Enable saving into `dir`
    ///
    /// # Errors
    /// Returns an error if `dir` cannot be created or the background worker
    /// cannot be spawned.
    pub fn start_recording(self: &Arc<Self>, dir: PathBuf) -> Result<()> {
        std::fs::create_dir_all(&dir)?;
        self.state.lock().recording_dir = Some(dir.clone());

        if self.save_in_background() {
            let saver = BackgroundSaver::spawn(Arc::downgrade(self), self.background_interval)?;
            if let Some(mut previous) = self.saver.lock().replace(saver) {
                previous.stop();
            }
        }

        {
            let _ingest = self.ingest.lock();
            self.saving_enabled.store(true, Ordering::SeqCst);
        }
        info!(source = %self.name, dir = %dir.display(), "recording started");
        Ok(())
    }

    /// Disable saving
    ///
    /// The background worker (if any) does a final flush first. Items that
    /// were tagged for saving but never written are released so the buffer
    /// can reclaim them.
    pub fn stop_recording(&self) {
        // Every item tagged for saving is in the buffer once the flag is off.
        {
            let _ingest = self.ingest.lock();
            self.saving_enabled.store(false, Ordering::SeqCst);
        }

        let saver = self.saver.lock().take();
        if let Some(mut saver) = saver {
            saver.stop();
        }

        let released = self.buffer.release_unsaved();
        self.state.lock().recording_dir = None;
        info!(source = %self.name, released, "recording stopped");
    }

    /// Replace the buffer with the items recorded in `dir`
    ///
    /// Returns the first and last recorded timestamps, `(0, 0)` when the
    /// directory holds no items.
    ///
    /// # Errors
    /// `Corrupt` if the recorded items cannot be read back.
    pub fn start_playback(&self, dir: &Path) -> Result<(u64, u64)> {
        let items = self.with_recorder(|recorder| recorder.load(dir))?;

        self.clear_buffer();
        let count = items.len();
        for item in items {
            self.buffer.append(item)?;
        }
        self.playing_back.store(true, Ordering::SeqCst);

        info!(source = %self.name, dir = %dir.display(), items = count, "playback loaded");
        Ok((self.first_timestamp(), self.last_timestamp()))
    }

    pub fn stop_playback(&self) {
        self.playing_back.store(false, Ordering::SeqCst);
        self.clear_buffer();
    }

    /// Subscribe to the device's acquisition
    ///
    /// The callback only holds a weak reference, so a removed source stops
    /// receiving data even if the device keeps producing.
    pub fn start_acquisition(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let callback: ItemCallback = Arc::new(move |item| {
            let Some(source) = weak.upgrade() else {
                return;
            };
            if let Err(e) = source.add_data(item) {
                warn!(source = %source.name(), error = %e, "item rejected");
            }
        });
        self.handler.listen(callback);
    }

    pub fn stop_acquisition(&self) {
        self.handler.stop();
    }
}

impl Drop for DataSource {
    fn drop(&mut self) {
        self.handler.stop();
        if let Some(mut saver) = self.saver.get_mut().take() {
            saver.stop();
        }
    }
}
