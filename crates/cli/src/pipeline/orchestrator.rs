//! Session orchestrator - builds the manager and drives it to completion.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Clock, ManagerConfig, ManagerEvent, SourceConfig, SystemClock};
use parking_lot::Mutex;
use source_manager::{DataSourceManager, FactoryRegistry, ManagerRunner, SharedManager};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::SessionStats;
use crate::error::{CliError, Result, SessionContext};

/// What the session does with its sources
#[derive(Debug, Clone)]
pub enum SessionMode {
    Live {
        /// Factories to add after the configured sources
        extra_sources: Vec<String>,
        record: bool,
        record_dir: Option<PathBuf>,
    },
    Playback {
        directory: PathBuf,
        descriptor: Option<PathBuf>,
        /// Raw nanosecond start time
        start: Option<String>,
        automatic: bool,
    },
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub manager: ManagerConfig,
    pub mode: SessionMode,

    /// Session timeout (None = until shutdown or end of playback)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main session orchestrator
pub struct Session {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Run until `shutdown` resolves, the timeout expires or automatic
    /// playback reaches the end of the recording
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<SessionStats> {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let registry = FactoryRegistry::new(devices::default_factories(Arc::clone(&self.clock)))
            .session_context("Failed to register device factories")?;
        info!(factories = ?registry.names(), "Device factories registered");

        let (manager, mut events, mut stats) = self.build_manager(registry)?;
        let automatic = manager.is_playing_back_automatically();
        info!(
            mode = %stats.mode,
            sources = stats.sources,
            fps = manager.frames_per_second(),
            "Session ready"
        );

        let manager: SharedManager = Arc::new(Mutex::new(manager));
        let runner = ManagerRunner::spawn(Arc::clone(&manager));

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Event channel closed");
                        break;
                    };
                    if handle_event(event, &mut stats, &manager, automatic) {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping session...");
                    break;
                }
                _ = &mut deadline => {
                    info!("Session timeout reached");
                    break;
                }
            }
        }

        info!("Shutting down session...");
        stats.driver_ticks = runner.shutdown().await;
        {
            let mut manager = manager.lock();
            if let Some(dir) = manager.stop_recording() {
                stats.recording_dir = Some(dir);
            }
            manager.stop_playback();
            manager.remove_all_sources();
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            ticks = stats.ticks,
            tick_rate = format!("{:.2}", stats.tick_rate()),
            "Session shutdown complete"
        );

        Ok(stats)
    }

    fn build_manager(
        &self,
        registry: FactoryRegistry,
    ) -> Result<(DataSourceManager, mpsc::Receiver<ManagerEvent>, SessionStats)> {
        let clock = Arc::clone(&self.clock);
        let manager_config = self.config.manager.clone();
        let mut stats = SessionStats::default();

        match &self.config.mode {
            SessionMode::Live {
                extra_sources,
                record,
                record_dir,
            } => {
                let mut manager = DataSourceManager::from_config(registry, clock, manager_config)
                    .session_context("Failed to add configured sources")?;
                for factory in extra_sources {
                    manager
                        .add_source(factory, SourceConfig::default())
                        .session_context(format!("Failed to add source from '{factory}'"))?;
                }
                if manager.source_count() == 0 {
                    return Err(CliError::session(
                        "Nothing to acquire",
                        contracts::ContractError::invalid_argument(
                            "no sources configured; add one with --source",
                        ),
                    ));
                }

                let events = manager.subscribe();
                if *record {
                    let dir = manager
                        .start_recording(record_dir.clone())
                        .session_context("Failed to start recording")?;
                    stats.recording_dir = Some(dir);
                }

                stats.mode = "live".to_string();
                stats.sources = manager.source_count();
                Ok((manager, events, stats))
            }
            SessionMode::Playback {
                directory,
                descriptor,
                start,
                automatic,
            } => {
                let mut manager = DataSourceManager::new(registry, clock, manager_config)
                    .session_context("Failed to create manager")?;
                let events = manager.subscribe();

                let range = manager
                    .start_playback(directory, descriptor.as_deref())
                    .session_context(format!("Failed to play back {}", directory.display()))?;

                if let Some(text) = start {
                    let value = manager
                        .compute_playback_time_slider_value_from_text(text)
                        .session_context("Invalid start time")?;
                    let time = manager
                        .compute_time_from_slider(value)
                        .session_context("Invalid start time")?;
                    manager
                        .set_playback_time(time)
                        .session_context("Invalid start time")?;
                }
                manager
                    .set_playing_back_automatically(*automatic)
                    .session_context("Failed to configure playback")?;

                stats.mode = "playback".to_string();
                stats.sources = manager.source_count();
                stats.playback_range = Some(range);
                Ok((manager, events, stats))
            }
        }
    }
}

/// Fold one event into the stats; returns `true` when the session is done
fn handle_event(
    event: ManagerEvent,
    stats: &mut SessionStats,
    manager: &SharedManager,
    automatic: bool,
) -> bool {
    match event {
        ManagerEvent::UpdateFinished {
            requested_ns,
            statuses,
        } => {
            stats.ticks += 1;
            stats.tick_metrics.update(&statuses);
            let current = statuses.iter().filter(|s| s.is_current).count();
            debug!(
                requested_ns,
                current,
                sources = statuses.len(),
                "Tick finished"
            );
        }
        ManagerEvent::TimerUpdated { raw_ns, human } => {
            debug!(raw_ns, time = %human, "Timer updated");
        }
        ManagerEvent::PlaybackAdvanced { slider_value } => {
            debug!(slider_value, "Playback advanced");
            if automatic && !manager.lock().is_playing_back_automatically() {
                info!("Reached the end of the recording");
                return true;
            }
        }
        ManagerEvent::RecordingStarted { directory } => {
            info!(dir = %directory.display(), "Recording started");
        }
        ManagerEvent::RecordingStopped => {
            info!("Recording stopped");
        }
        ManagerEvent::BroadcastStatus { message } => {
            info!(%message, "Manager status");
        }
        ManagerEvent::RenderRequested => {}
    }
    false
}
