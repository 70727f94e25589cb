//! DataSourceManager - orchestrates every source through live ticking,
//! recording and playback.
//!
//! The manager is driven from one logical thread: `on_tick` for the periodic
//! update, the remaining methods for user actions. Device threads only touch
//! their own `DataSource`.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{
    Clock, ContractError, DataSourceFactory, ManagerConfig, ManagerEvent, ManagerMode,
    PlaybackRange, Result, SourceConfig, SourceStatus, NANOS_PER_SECOND,
};
use sync_engine::DataSource;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::session::{
    default_recording_root, session_directory_name, source_directory_name, Descriptor,
    PlaybackSession, RecordingSession, DESCRIPTOR_FILE_NAME,
};
use crate::{FactoryRegistry, SliderMapping};

/// Highest supported tick rate (Hz)
pub const MAX_FRAMES_PER_SECOND: u32 = 1000;

/// One row of the manager
struct SourceEntry {
    name: String,
    factory: String,
    source: Arc<DataSource>,
    frozen: bool,
}

/// Coordinates a set of data sources
pub struct DataSourceManager {
    registry: FactoryRegistry,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,

    sources: Vec<SourceEntry>,
    /// Live rows set aside while a recording plays back
    stashed_live: Vec<SourceEntry>,
    /// Suffix for generated row labels, never reused
    next_label: usize,

    timer_on: bool,
    current_time_ns: u64,
    recording: Option<RecordingSession>,
    playback: Option<PlaybackSession>,

    events: Option<mpsc::Sender<ManagerEvent>>,
}

impl std::fmt::Debug for DataSourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceManager")
            .field("mode", &self.mode())
            .field("sources", &self.source_names())
            .field("timer_on", &self.timer_on)
            .field("recording", &self.is_recording())
            .field("current_time_ns", &self.current_time_ns)
            .finish()
    }
}

impl DataSourceManager {
    /// Create an empty manager
    ///
    /// # Errors
    /// `InvalidArgument` if the configured tick rate is out of range.
    pub fn new(
        registry: FactoryRegistry,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Result<Self> {
        check_frames_per_second(config.frames_per_second)?;

        Ok(Self {
            registry,
            clock,
            config,
            sources: Vec::new(),
            stashed_live: Vec::new(),
            next_label: 0,
            timer_on: false,
            current_time_ns: 0,
            recording: None,
            playback: None,
            events: None,
        })
    }

    /// Create a manager and add every configured source in order
    pub fn from_config(
        registry: FactoryRegistry,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let entries = config.sources.clone();
        let mut manager = Self::new(registry, clock, config)?;
        for entry in entries {
            manager.add_source(&entry.factory, entry.config)?;
        }
        Ok(manager)
    }

    /// Open the event channel
    ///
    /// Replaces any previous subscriber. Events are dropped, never awaited,
    /// when the subscriber falls behind.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ManagerEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_queue_capacity.max(1));
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: ManagerEvent) {
        let Some(tx) = self.events.as_ref() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event subscriber gone");
            }
        }
    }

    // ===== Factories & rows =====

    pub fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }

    pub fn factory_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn needs_startup_config(&self, factory_name: &str) -> Result<bool> {
        self.registry.needs_startup_config(factory_name)
    }

    pub fn factory(&self, factory_name: &str) -> Result<&Arc<dyn DataSourceFactory>> {
        self.registry.get(factory_name)
    }

    /// Factory that built row `row`
    pub fn factory_for_row(&self, row: usize) -> Result<&Arc<dyn DataSourceFactory>> {
        let entry = self.entry(row)?;
        self.registry.get(&entry.factory)
    }

    pub fn source(&self, row: usize) -> Result<&Arc<DataSource>> {
        Ok(&self.entry(row)?.source)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|e| e.name.as_str()).collect()
    }

    fn entry(&self, row: usize) -> Result<&SourceEntry> {
        self.sources
            .get(row)
            .ok_or_else(|| row_out_of_range(row, self.sources.len()))
    }

    fn entry_mut(&mut self, row: usize) -> Result<&mut SourceEntry> {
        let len = self.sources.len();
        self.sources
            .get_mut(row)
            .ok_or_else(|| row_out_of_range(row, len))
    }

    // ===== Add / remove =====

    /// Build a source from a registered factory and append it as a new row
    ///
    /// Starts the tick timer if this is the first source. If a recording is
    /// in progress the new source records into the same session.
    ///
    /// # Errors
    /// `NotFound` for an unknown factory, `InvalidState` during playback,
    /// `InvalidArgument` for a row label that is taken or would record into
    /// the same directory as an existing row, or the factory's own error.
    /// The manager is unchanged on error.
    #[instrument(name = "manager_add_source", skip(self, config))]
    pub fn add_source(&mut self, factory_name: &str, config: SourceConfig) -> Result<usize> {
        if self.is_playing_back() {
            return Err(ContractError::invalid_state(
                "cannot add a live source while playing back",
            ));
        }

        let factory = Arc::clone(self.registry.get(factory_name)?);
        let name = match config.name.clone() {
            Some(name) => name,
            None => format!("{}-{}", factory.display_name(), self.next_label),
        };
        let directory = source_directory_name(&name);
        if let Some(existing) = self
            .sources
            .iter()
            .find(|e| e.name == name || source_directory_name(&e.name) == directory)
        {
            return Err(ContractError::invalid_argument(format!(
                "source '{name}' clashes with existing source '{}'",
                existing.name
            )));
        }

        let handler = factory.create(&config)?;
        let source = Arc::new(DataSource::new(name.clone(), handler, &config));

        if let Some(recording) = self.recording.as_mut() {
            let dir = recording.add_source(&name, source.device_type())?;
            if let Err(e) = source.start_recording(dir) {
                if let Err(rollback) = recording.remove_source(&name) {
                    warn!(source = %name, error = %rollback, "descriptor rollback failed");
                }
                return Err(e);
            }
        }

        source.start_acquisition();
        self.next_label += 1;
        self.sources.push(SourceEntry {
            name: name.clone(),
            factory: factory.display_name().to_string(),
            source,
            frozen: false,
        });
        let row = self.sources.len() - 1;

        info!(row, source = %name, factory = %factory_name, "source added");

        if self.sources.len() == 1 {
            self.start_update_timer();
        }
        Ok(row)
    }

    /// Remove row `row`
    ///
    /// The timer is stopped around the mutation and restarted only if rows
    /// remain. Data already recorded by the source stays on disk.
    pub fn remove_source(&mut self, row: usize) -> Result<()> {
        self.entry(row)?;

        let was_on = self.timer_on;
        self.stop_update_timer();

        let entry = self.sources.remove(row);
        shutdown_entry(&entry);
        info!(row, source = %entry.name, "source removed");

        if was_on && !self.sources.is_empty() {
            self.start_update_timer();
        }
        Ok(())
    }

    pub fn remove_all_sources(&mut self) {
        self.stop_update_timer();
        for entry in self.sources.drain(..) {
            shutdown_entry(&entry);
        }
        info!("all sources removed");
    }

    // ===== Freeze =====

    /// Stop (or resume) asking a source to update, without stopping its
    /// acquisition
    pub fn freeze_source(&mut self, row: usize, frozen: bool) -> Result<()> {
        let entry = self.entry_mut(row)?;
        entry.frozen = frozen;
        debug!(row, source = %entry.name, frozen, "source freeze changed");
        Ok(())
    }

    pub fn freeze_all(&mut self, frozen: bool) {
        for entry in &mut self.sources {
            entry.frozen = frozen;
        }
    }

    pub fn is_frozen(&self, row: usize) -> Result<bool> {
        Ok(self.entry(row)?.frozen)
    }

    // ===== Timer =====

    /// Turn ticking on; no-op without sources
    pub fn start_update_timer(&mut self) {
        if self.sources.is_empty() {
            return;
        }
        if !self.timer_on {
            self.timer_on = true;
            debug!(interval_ms = self.tick_interval().as_millis() as u64, "update timer started");
        }
    }

    pub fn stop_update_timer(&mut self) {
        if self.timer_on {
            self.timer_on = false;
            debug!("update timer stopped");
        }
    }

    pub fn is_update_timer_on(&self) -> bool {
        self.timer_on
    }

    pub fn frames_per_second(&self) -> u32 {
        self.config.frames_per_second
    }

    /// Change the tick rate
    ///
    /// # Errors
    /// `InvalidArgument` outside `1..=1000`.
    pub fn set_frames_per_second(&mut self, frames_per_second: u32) -> Result<()> {
        check_frames_per_second(frames_per_second)?;
        self.config.frames_per_second = frames_per_second;

        // Slider single step is one tick.
        if let Some(playback) = self.playback.as_mut() {
            playback.mapping = SliderMapping::new(
                playback.mapping.base_ns(),
                playback.mapping.end_ns(),
                self.config.slider_resolution,
                self.config.tick_period_ns(),
            )?;
        }

        info!(frames_per_second, "tick rate changed");
        Ok(())
    }

    /// Tick period for the timer driving `on_tick`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(self.config.tick_period_ns())
    }

    // ===== Tick =====

    pub fn mode(&self) -> ManagerMode {
        if self.playback.is_some() {
            ManagerMode::Playback
        } else if self.sources.is_empty() {
            ManagerMode::Idle
        } else {
            ManagerMode::Live
        }
    }

    /// Time the last tick asked every source for
    pub fn current_time_ns(&self) -> u64 {
        self.current_time_ns
    }

    /// Process the current time on every source
    ///
    /// Live mode requests "now" from the clock, playback mode the scrub time
    /// (advanced one tick when playing automatically). Frozen sources are
    /// skipped. Buffers are only cleaned in live mode. Emits one batched
    /// `UpdateFinished`, a `TimerUpdated` and one `RenderRequested`.
    ///
    /// Returns the per-source statuses, empty while the timer is off.
    #[instrument(name = "manager_tick", skip(self), fields(sources = self.sources.len()))]
    pub fn on_tick(&mut self) -> Vec<SourceStatus> {
        if !self.timer_on {
            return Vec::new();
        }

        let live = self.playback.is_none();
        let requested_ns = if live {
            self.clock.now_ns()
        } else {
            self.advance_playback()
        };
        self.current_time_ns = requested_ns;

        let statuses: Vec<SourceStatus> = self
            .sources
            .iter()
            .enumerate()
            .map(|(row, entry)| {
                let source = &entry.source;
                let is_current = !entry.frozen && source.process_data(requested_ns);
                let frame_rate_hz = source.update_frame_rate();
                if live {
                    source.clean_buffer();
                }

                SourceStatus {
                    row,
                    name: entry.name.clone(),
                    device_type: source.device_type().to_string(),
                    frame_rate_hz,
                    lag_ms: source.current_time_lag_ms(requested_ns),
                    is_current,
                    actual_timestamp_ns: source.last_resolution().map_or(0, |r| r.actual_ns),
                    buffer_len: source.buffer_len(),
                    frozen: entry.frozen,
                }
            })
            .collect();

        observability::record_tick_metrics(&statuses);

        self.emit(ManagerEvent::UpdateFinished {
            requested_ns,
            statuses: statuses.clone(),
        });
        self.emit(ManagerEvent::TimerUpdated {
            raw_ns: requested_ns,
            human: format_timestamp(requested_ns),
        });
        self.emit(ManagerEvent::RenderRequested);

        statuses
    }

    fn advance_playback(&mut self) -> u64 {
        let tick_ns = self.config.tick_period_ns();
        let current = self.current_time_ns;
        let Some(playback) = self.playback.as_mut() else {
            return current;
        };
        if !playback.automatic {
            return current;
        }

        let end_ns = playback.mapping.end_ns();
        let mut next = current.saturating_add(tick_ns);
        if next >= end_ns {
            next = end_ns;
            playback.automatic = false;
            info!("automatic playback reached the end of the recording");
        }

        let slider_value = playback.mapping.slider_value_for_time(next);
        self.emit(ManagerEvent::PlaybackAdvanced { slider_value });
        next
    }

    // ===== Recording =====

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn recording_directory(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.directory.as_path())
    }

    /// Root new sessions are created in
    pub fn recording_root(&self) -> PathBuf {
        self.config
            .recording_root
            .clone()
            .unwrap_or_else(default_recording_root)
    }

    /// Start saving on every source
    ///
    /// `directory` defaults to a new time-stamped session under the
    /// recording root. Writes the descriptor before any source saves.
    ///
    /// # Errors
    /// `InvalidState` while playing back or already recording; I/O errors
    /// creating the session. Sources started before a failure are stopped
    /// again.
    #[instrument(name = "manager_start_recording", skip(self))]
    pub fn start_recording(&mut self, directory: Option<PathBuf>) -> Result<PathBuf> {
        if self.is_playing_back() {
            return Err(ContractError::invalid_state("cannot record while playing back"));
        }
        if self.is_recording() {
            return Err(ContractError::invalid_state("already recording"));
        }

        let directory = match directory {
            Some(dir) => dir,
            None => self
                .recording_root()
                .join(session_directory_name(&chrono::Local::now())),
        };
        std::fs::create_dir_all(&directory)?;

        let mut session = RecordingSession::new(directory.clone());
        for entry in &self.sources {
            session
                .descriptor
                .insert(source_directory_name(&entry.name), entry.source.device_type());
        }
        session.descriptor.write(&session.descriptor_path())?;

        for (started, entry) in self.sources.iter().enumerate() {
            let dir = session.source_directory(&entry.name);
            if let Err(e) = entry.source.start_recording(dir) {
                for done in &self.sources[..started] {
                    done.source.stop_recording();
                }
                return Err(e);
            }
        }

        info!(dir = %directory.display(), sources = self.sources.len(), "recording started");
        self.recording = Some(session);
        self.emit(ManagerEvent::RecordingStarted {
            directory: directory.clone(),
        });
        Ok(directory)
    }

    /// Stop saving on every source; returns the session directory
    pub fn stop_recording(&mut self) -> Option<PathBuf> {
        let session = self.recording.take()?;
        for entry in &self.sources {
            entry.source.stop_recording();
        }

        info!(dir = %session.directory.display(), "recording stopped");
        self.emit(ManagerEvent::RecordingStopped);
        Some(session.directory)
    }

    // ===== Playback =====

    pub fn is_playing_back(&self) -> bool {
        self.playback.is_some()
    }

    /// Replace the live rows by the sources recorded in `directory`
    ///
    /// `descriptor` defaults to `<directory>/descriptor.toml`. Everything is
    /// parsed, resolved and loaded before the manager changes: live rows are
    /// set aside (acquisition paused) and restored by `stop_playback`.
    ///
    /// # Errors
    /// - `InvalidState` while recording or already playing back
    /// - `Corrupt` for an unreadable descriptor or recording, or one
    ///   holding no items
    /// - `NotFound` for a device type without a registered factory
    #[instrument(name = "manager_start_playback", skip(self))]
    pub fn start_playback(
        &mut self,
        directory: &Path,
        descriptor: Option<&Path>,
    ) -> Result<PlaybackRange> {
        if self.is_recording() {
            return Err(ContractError::invalid_state("cannot play back while recording"));
        }
        if self.is_playing_back() {
            return Err(ContractError::invalid_state("already playing back"));
        }

        let descriptor_path = descriptor
            .map(Path::to_path_buf)
            .unwrap_or_else(|| directory.join(DESCRIPTOR_FILE_NAME));
        let descriptor = Descriptor::read(&descriptor_path)?;
        if descriptor.sources.is_empty() {
            return Err(ContractError::corrupt(
                descriptor_path.display().to_string(),
                "descriptor lists no sources",
            ));
        }

        let factories = descriptor
            .sources
            .iter()
            .map(|entry| {
                self.registry
                    .for_device_type(&entry.device_type)
                    .map(|factory| (entry.directory.clone(), Arc::clone(factory)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(factories.len());
        let mut start_ns = u64::MAX;
        let mut end_ns = 0u64;
        for (dir, factory) in factories {
            let config = SourceConfig {
                name: Some(dir.clone()),
                ..Default::default()
            };
            let handler = factory.create(&config)?;
            let source = Arc::new(DataSource::new(dir.clone(), handler, &config));
            let (first, last) = source.start_playback(&directory.join(&dir))?;

            if source.buffer_len() > 0 {
                start_ns = start_ns.min(first);
                end_ns = end_ns.max(last);
            } else {
                warn!(source = %dir, "recorded source holds no items");
            }

            entries.push(SourceEntry {
                name: dir,
                factory: factory.display_name().to_string(),
                source,
                frozen: false,
            });
        }

        if start_ns > end_ns {
            return Err(ContractError::corrupt(
                directory.display().to_string(),
                "recording holds no items",
            ));
        }

        let mapping = SliderMapping::new(
            start_ns,
            end_ns,
            self.config.slider_resolution,
            self.config.tick_period_ns(),
        )?;

        // Nothing below can fail.
        self.stop_update_timer();
        self.stashed_live = mem::replace(&mut self.sources, entries);
        for entry in &self.stashed_live {
            entry.source.stop_acquisition();
        }
        self.playback = Some(PlaybackSession {
            directory: directory.to_path_buf(),
            mapping,
            automatic: false,
        });
        self.current_time_ns = start_ns;
        self.start_update_timer();

        info!(
            dir = %directory.display(),
            sources = self.sources.len(),
            start_ns,
            end_ns,
            slider_max = mapping.max(),
            "playback started"
        );
        self.emit(ManagerEvent::BroadcastStatus {
            message: format!("playing back {}", directory.display()),
        });

        Ok(mapping.range(0))
    }

    /// Drop the playback rows and restore the live ones
    pub fn stop_playback(&mut self) {
        let Some(playback) = self.playback.take() else {
            return;
        };

        self.stop_update_timer();
        for entry in self.sources.drain(..) {
            entry.source.stop_playback();
        }
        self.sources = mem::take(&mut self.stashed_live);
        for entry in &self.sources {
            entry.source.start_acquisition();
        }
        self.start_update_timer();

        info!(dir = %playback.directory.display(), "playback stopped");
        self.emit(ManagerEvent::BroadcastStatus {
            message: "playback stopped".to_string(),
        });
    }

    fn playback_session(&self) -> Result<&PlaybackSession> {
        self.playback
            .as_ref()
            .ok_or_else(|| ContractError::invalid_state("not playing back"))
    }

    pub fn playback_range(&self) -> Option<PlaybackRange> {
        self.playback.as_ref().map(|p| {
            let value = p.mapping.slider_value_for_time(self.current_time_ns);
            p.mapping.range(value)
        })
    }

    /// Scrub to `timestamp_ns`, clamped to the recorded range
    ///
    /// The next tick processes this time. Setting the same time twice is a
    /// no-op.
    pub fn set_playback_time(&mut self, timestamp_ns: u64) -> Result<()> {
        let mapping = self.playback_session()?.mapping;
        self.current_time_ns = timestamp_ns.clamp(mapping.base_ns(), mapping.end_ns());
        Ok(())
    }

    /// Advance one tick period on every tick until the end of the recording
    pub fn set_playing_back_automatically(&mut self, automatic: bool) -> Result<()> {
        let playback = self
            .playback
            .as_mut()
            .ok_or_else(|| ContractError::invalid_state("not playing back"))?;
        playback.automatic = automatic;
        debug!(automatic, "automatic playback changed");
        Ok(())
    }

    pub fn is_playing_back_automatically(&self) -> bool {
        self.playback.as_ref().is_some_and(|p| p.automatic)
    }

    /// Slider value -> absolute time
    pub fn compute_time_from_slider(&self, value: i32) -> Result<u64> {
        Ok(self.playback_session()?.mapping.time_from_slider(value))
    }

    /// Absolute time -> slider value
    pub fn compute_playback_time_slider_value(&self, timestamp_ns: u64) -> Result<i32> {
        Ok(self
            .playback_session()?
            .mapping
            .slider_value_for_time(timestamp_ns))
    }

    /// Raw nanosecond timestamp typed as text -> slider value
    pub fn compute_playback_time_slider_value_from_text(&self, text: &str) -> Result<i32> {
        self.playback_session()?.mapping.slider_value_for_text(text)
    }
}

impl Drop for DataSourceManager {
    fn drop(&mut self) {
        self.stop_recording();
        for entry in self.sources.iter().chain(self.stashed_live.iter()) {
            entry.source.stop_acquisition();
        }
    }
}

fn shutdown_entry(entry: &SourceEntry) {
    entry.source.stop_acquisition();
    if entry.source.is_saving() {
        entry.source.stop_recording();
    }
}

fn check_frames_per_second(frames_per_second: u32) -> Result<()> {
    if frames_per_second == 0 || frames_per_second > MAX_FRAMES_PER_SECOND {
        return Err(ContractError::invalid_argument(format!(
            "frames per second must be in 1..={MAX_FRAMES_PER_SECOND}, got {frames_per_second}"
        )));
    }
    Ok(())
}

fn row_out_of_range(row: usize, len: usize) -> ContractError {
    ContractError::invalid_argument(format!("source row {row} out of range (0..{len})"))
}

/// UTC wall-clock rendering of a device timestamp
pub fn format_timestamp(timestamp_ns: u64) -> String {
    let secs = (timestamp_ns / NANOS_PER_SECOND) as i64;
    let nanos = (timestamp_ns % NANOS_PER_SECOND) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| timestamp_ns.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        DataItem, DeviceHandler, ItemCallback, ManualClock, Payload, TrackingData,
        NANOS_PER_MILLI,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Handler whose acquisition is driven by the test through the callback
    #[derive(Default)]
    struct ScriptedHandler {
        callback: Mutex<Option<ItemCallback>>,
        listening: AtomicBool,
        updates: AtomicUsize,
    }

    impl ScriptedHandler {
        fn push(&self, timestamp_ns: u64) {
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback(DataItem::new(
                    timestamp_ns,
                    100 * NANOS_PER_MILLI,
                    Payload::Tracking(TrackingData::identity(&["pointer"])),
                ));
            }
        }
    }

    impl DeviceHandler for ScriptedHandler {
        fn device_type(&self) -> &str {
            "scripted"
        }

        fn update(&self, _item: &DataItem) -> Result<bool> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn listen(&self, callback: ItemCallback) {
            *self.callback.lock() = Some(callback);
            self.listening.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.listening.store(false, Ordering::SeqCst);
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::SeqCst)
        }
    }

    /// Factory handing out handlers the test keeps a reference to
    #[derive(Default)]
    struct ScriptedFactory {
        handlers: Mutex<Vec<Arc<ScriptedHandler>>>,
    }

    impl DataSourceFactory for ScriptedFactory {
        fn display_name(&self) -> &str {
            "Scripted"
        }

        fn device_type(&self) -> &str {
            "scripted"
        }

        fn create(&self, _config: &SourceConfig) -> Result<Arc<dyn DeviceHandler>> {
            let handler = Arc::new(ScriptedHandler::default());
            self.handlers.lock().push(Arc::clone(&handler));
            Ok(handler)
        }
    }

    struct Fixture {
        manager: DataSourceManager,
        factory: Arc<ScriptedFactory>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn handler(&self, index: usize) -> Arc<ScriptedHandler> {
            Arc::clone(&self.factory.handlers.lock()[index])
        }
    }

    fn fixture(config: ManagerConfig) -> Fixture {
        let factory = Arc::new(ScriptedFactory::default());
        let clock = Arc::new(ManualClock::new(NANOS_PER_SECOND));
        let registry =
            FactoryRegistry::new(vec![Arc::clone(&factory) as Arc<dyn DataSourceFactory>])
                .unwrap();
        let manager =
            DataSourceManager::new(registry, Arc::clone(&clock) as Arc<dyn Clock>, config)
                .unwrap();
        Fixture {
            manager,
            factory,
            clock,
        }
    }

    #[test]
    fn test_rejects_bad_frame_rate() {
        let factory: Arc<dyn DataSourceFactory> = Arc::new(ScriptedFactory::default());
        let registry = FactoryRegistry::new(vec![factory]).unwrap();
        let config = ManagerConfig {
            frames_per_second: 0,
            ..Default::default()
        };
        assert!(DataSourceManager::new(registry, Arc::new(ManualClock::new(1)), config).is_err());
    }

    #[test]
    fn test_add_source_starts_timer() {
        let mut fx = fixture(ManagerConfig::default());
        assert_eq!(fx.manager.mode(), ManagerMode::Idle);
        assert!(fx.manager.on_tick().is_empty());

        let row = fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        assert_eq!(row, 0);
        assert!(fx.manager.is_update_timer_on());
        assert_eq!(fx.manager.mode(), ManagerMode::Live);
        assert_eq!(fx.manager.source_names(), vec!["Scripted-0"]);
        assert!(fx.handler(0).is_listening());
    }

    #[test]
    fn test_add_unknown_factory() {
        let mut fx = fixture(ManagerConfig::default());
        let err = fx.manager.add_source("Aurora", SourceConfig::default()).unwrap_err();
        assert!(matches!(err, ContractError::NotFound { .. }));
        assert_eq!(fx.manager.source_count(), 0);
        assert!(!fx.manager.is_update_timer_on());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut fx = fixture(ManagerConfig::default());
        let config = SourceConfig {
            name: Some("pointer".into()),
            ..Default::default()
        };
        fx.manager.add_source("Scripted", config.clone()).unwrap();
        assert!(fx.manager.add_source("Scripted", config).is_err());
        assert_eq!(fx.manager.source_count(), 1);
    }

    #[test]
    fn test_tick_processes_every_source() {
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();

        let now = fx.clock.now_ns();
        fx.handler(0).push(now - 10 * NANOS_PER_MILLI);
        fx.handler(0).push(now);
        // Second source only has data far in the past.
        fx.handler(1).push(now - 5 * NANOS_PER_SECOND);

        let statuses = fx.manager.on_tick();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_current);
        assert_eq!(statuses[0].actual_timestamp_ns, now);
        assert!((statuses[0].frame_rate_hz - 100.0).abs() < 1e-6);
        assert!(!statuses[1].is_current);
        assert_eq!(fx.manager.current_time_ns(), now);
        assert_eq!(fx.handler(0).updates.load(Ordering::SeqCst), 1);
        assert_eq!(fx.handler(1).updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_frozen_source_buffers_but_skips_update() {
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.freeze_source(0, true).unwrap();
        assert!(fx.manager.is_frozen(0).unwrap());

        let now = fx.clock.now_ns();
        fx.handler(0).push(now);
        let statuses = fx.manager.on_tick();

        assert!(statuses[0].frozen);
        assert!(!statuses[0].is_current);
        assert_eq!(statuses[0].buffer_len, 1);
        assert_eq!(fx.handler(0).updates.load(Ordering::SeqCst), 0);

        fx.manager.freeze_all(false);
        assert!(fx.manager.on_tick()[0].is_current);
    }

    #[test]
    fn test_remove_source_restarts_timer_only_if_rows_remain() {
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();

        fx.manager.remove_source(0).unwrap();
        assert!(fx.manager.is_update_timer_on());
        assert_eq!(fx.manager.source_names(), vec!["Scripted-1"]);
        assert!(!fx.handler(0).is_listening());

        assert!(fx.manager.remove_source(5).is_err());

        fx.manager.remove_source(0).unwrap();
        assert!(!fx.manager.is_update_timer_on());
        assert_eq!(fx.manager.mode(), ManagerMode::Idle);
    }

    #[test]
    fn test_remove_all_sources() {
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.remove_all_sources();
        assert_eq!(fx.manager.source_count(), 0);
        assert!(!fx.manager.is_update_timer_on());
    }

    #[test]
    fn test_tick_events() {
        let mut fx = fixture(ManagerConfig::default());
        let mut events = fx.manager.subscribe();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.on_tick();

        let Ok(ManagerEvent::UpdateFinished { statuses, .. }) = events.try_recv() else {
            panic!("expected UpdateFinished");
        };
        assert_eq!(statuses.len(), 1);
        assert!(matches!(events.try_recv(), Ok(ManagerEvent::TimerUpdated { .. })));
        assert!(matches!(events.try_recv(), Ok(ManagerEvent::RenderRequested)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_full_event_queue_never_blocks() {
        let mut fx = fixture(ManagerConfig {
            event_queue_capacity: 1,
            ..Default::default()
        });
        let _events = fx.manager.subscribe();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        for _ in 0..10 {
            fx.manager.on_tick();
        }
    }

    #[test]
    fn test_set_frames_per_second() {
        let mut fx = fixture(ManagerConfig::default());
        assert_eq!(fx.manager.tick_interval(), Duration::from_millis(50));
        fx.manager.set_frames_per_second(40).unwrap();
        assert_eq!(fx.manager.tick_interval(), Duration::from_millis(25));
        assert!(fx.manager.set_frames_per_second(0).is_err());
        assert!(fx.manager.set_frames_per_second(1001).is_err());
        assert_eq!(fx.manager.frames_per_second(), 40);
    }

    fn record_session(fx: &mut Fixture, dir: &Path) {
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.start_recording(Some(dir.to_path_buf())).unwrap();

        let base = fx.clock.now_ns();
        for i in 0..10 {
            fx.handler(0).push(base + i * 100 * NANOS_PER_MILLI);
            fx.handler(1).push(base + NANOS_PER_SECOND / 2 + i * 100 * NANOS_PER_MILLI);
        }
        fx.manager.stop_recording().unwrap();
    }

    #[test]
    fn test_recording_writes_descriptor_and_items() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        let mut events = fx.manager.subscribe();
        record_session(&mut fx, dir.path());

        let descriptor = Descriptor::read(&dir.path().join(DESCRIPTOR_FILE_NAME)).unwrap();
        assert_eq!(descriptor.len(), 2);
        assert_eq!(descriptor.device_type("Scripted-0"), Some("scripted"));

        let saved = std::fs::read_dir(dir.path().join("Scripted-0")).unwrap().count();
        assert_eq!(saved, 10);
        assert!(!fx.manager.is_recording());

        assert!(matches!(events.try_recv(), Ok(ManagerEvent::RecordingStarted { .. })));
        assert!(matches!(events.try_recv(), Ok(ManagerEvent::RecordingStopped)));
    }

    #[test]
    fn test_source_added_during_recording_joins_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.start_recording(Some(dir.path().to_path_buf())).unwrap();
        assert!(fx.manager.start_recording(None).is_err());

        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.handler(1).push(fx.clock.now_ns());
        fx.manager.stop_recording();

        let descriptor = Descriptor::read(&dir.path().join(DESCRIPTOR_FILE_NAME)).unwrap();
        assert!(descriptor.device_type("Scripted-1").is_some());
        assert_eq!(std::fs::read_dir(dir.path().join("Scripted-1")).unwrap().count(), 1);
    }

    #[test]
    fn test_labels_sharing_a_directory_rejected() {
        let mut fx = fixture(ManagerConfig::default());
        let named = |name: &str| SourceConfig {
            name: Some(name.into()),
            ..Default::default()
        };
        fx.manager.add_source("Scripted", named("cam/left")).unwrap();

        let err = fx.manager.add_source("Scripted", named("cam:left")).unwrap_err();
        assert!(matches!(err, ContractError::InvalidArgument { .. }));
        assert_eq!(fx.manager.source_names(), vec!["cam/left"]);
    }

    #[test]
    fn test_failed_join_leaves_descriptor_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.start_recording(Some(dir.path().to_path_buf())).unwrap();

        // A plain file where the next row's directory would go
        std::fs::write(dir.path().join("Scripted-1"), b"").unwrap();
        assert!(fx.manager.add_source("Scripted", SourceConfig::default()).is_err());
        assert_eq!(fx.manager.source_count(), 1);

        let descriptor = Descriptor::read(&dir.path().join(DESCRIPTOR_FILE_NAME)).unwrap();
        assert_eq!(descriptor.len(), 1);
        assert_eq!(descriptor.device_type("Scripted-1"), None);
    }

    #[test]
    fn test_playback_keeps_recorded_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        for name in ["zeta", "cam/left", "alpha"] {
            let config = SourceConfig {
                name: Some(name.into()),
                ..Default::default()
            };
            fx.manager.add_source("Scripted", config).unwrap();
        }
        fx.manager.start_recording(Some(dir.path().to_path_buf())).unwrap();
        let base = fx.clock.now_ns();
        for row in 0..3u64 {
            for i in 0..=row {
                fx.handler(row as usize).push(base + i * 100 * NANOS_PER_MILLI);
            }
        }
        fx.manager.stop_recording();

        fx.manager.start_playback(dir.path(), None).unwrap();
        assert_eq!(fx.manager.source_names(), vec!["zeta", "cam_left", "alpha"]);
        let lens: Vec<_> = (0..3)
            .map(|row| fx.manager.source(row).unwrap().buffer_len())
            .collect();
        assert_eq!(lens, vec![1, 2, 3]);
    }

    #[test]
    fn test_playback_range_and_scrub() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        record_session(&mut fx, dir.path());
        let base = fx.clock.now_ns();

        let range = fx.manager.start_playback(dir.path(), None).unwrap();
        assert_eq!(range.start_ns, base);
        assert_eq!(range.end_ns, base + NANOS_PER_SECOND / 2 + 900 * NANOS_PER_MILLI);
        assert_eq!(range.slider_value, 0);
        assert!(range.slider_max > 0);
        assert_eq!(fx.manager.mode(), ManagerMode::Playback);
        assert!(fx.manager.start_recording(None).is_err());

        // Live rows are set aside with their acquisition paused.
        assert!(!fx.handler(0).is_listening());
        assert_eq!(fx.manager.source_names(), vec!["Scripted-0", "Scripted-1"]);

        fx.manager.set_playback_time(base + 300 * NANOS_PER_MILLI).unwrap();
        let statuses = fx.manager.on_tick();
        assert_eq!(statuses[0].actual_timestamp_ns, base + 300 * NANOS_PER_MILLI);
        assert!(statuses[0].is_current);
        assert!(!statuses[1].is_current);

        // Playback never cleans.
        assert_eq!(statuses[0].buffer_len, 10);

        let v = fx
            .manager
            .compute_playback_time_slider_value(base + 300 * NANOS_PER_MILLI)
            .unwrap();
        let t = fx.manager.compute_time_from_slider(v).unwrap();
        assert_eq!(fx.manager.compute_playback_time_slider_value(t).unwrap(), v);

        fx.manager.stop_playback();
        assert!(!fx.manager.is_playing_back());
        assert!(fx.handler(0).is_listening());
        assert_eq!(fx.manager.mode(), ManagerMode::Live);
    }

    #[test]
    fn test_automatic_playback_stops_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig {
            frames_per_second: 2,
            ..Default::default()
        });
        record_session(&mut fx, dir.path());

        let range = fx.manager.start_playback(dir.path(), None).unwrap();
        let mut events = fx.manager.subscribe();
        fx.manager.set_playing_back_automatically(true).unwrap();

        let mut ticks = 0;
        while fx.manager.is_playing_back_automatically() {
            fx.manager.on_tick();
            ticks += 1;
            assert!(ticks < 100);
        }
        // 1.4s range at 0.5s per tick
        assert_eq!(ticks, 3);
        assert_eq!(fx.manager.current_time_ns(), range.end_ns);

        let mut last_value = None;
        while let Ok(event) = events.try_recv() {
            if let ManagerEvent::PlaybackAdvanced { slider_value } = event {
                last_value = Some(slider_value);
            }
        }
        assert_eq!(last_value, Some(range.slider_max));
    }

    #[test]
    fn test_playback_unknown_device_type_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DESCRIPTOR_FILE_NAME),
            "version = 1\n[[sources]]\ndirectory = \"Aurora-0\"\ndevice_type = \"aurora\"\n",
        )
        .unwrap();

        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();

        let err = fx.manager.start_playback(dir.path(), None).unwrap_err();
        assert!(matches!(err, ContractError::NotFound { .. }));
        assert!(!fx.manager.is_playing_back());
        assert_eq!(fx.manager.source_names(), vec!["Scripted-0"]);
        assert!(fx.handler(0).is_listening());
    }

    #[test]
    fn test_playback_corrupt_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DESCRIPTOR_FILE_NAME), "not = [valid").unwrap();

        let mut fx = fixture(ManagerConfig::default());
        let err = fx.manager.start_playback(dir.path(), None).unwrap_err();
        assert!(matches!(err, ContractError::Corrupt { .. }));
        assert_eq!(fx.manager.mode(), ManagerMode::Idle);
    }

    #[test]
    fn test_playback_of_empty_recording_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = fixture(ManagerConfig::default());
        fx.manager.add_source("Scripted", SourceConfig::default()).unwrap();
        fx.manager.start_recording(Some(dir.path().to_path_buf())).unwrap();
        fx.manager.stop_recording();

        let err = fx.manager.start_playback(dir.path(), None).unwrap_err();
        assert!(matches!(err, ContractError::Corrupt { .. }));
        assert!(!fx.manager.is_playing_back());
    }

    #[test]
    fn test_playback_controls_require_playback() {
        let mut fx = fixture(ManagerConfig::default());
        assert!(fx.manager.set_playback_time(5).is_err());
        assert!(fx.manager.set_playing_back_automatically(true).is_err());
        assert!(fx.manager.compute_time_from_slider(0).is_err());
        assert!(fx.manager.playback_range().is_none());
        fx.manager.stop_playback();
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(1_500_000_000),
            "1970-01-01 00:00:01.500 UTC"
        );
    }
}
