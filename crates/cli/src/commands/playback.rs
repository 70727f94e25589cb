//! `playback` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use super::{apply_session_overrides, load_config, shutdown_signal};
use crate::cli::PlaybackArgs;
use crate::pipeline::{Session, SessionConfig, SessionMode};

/// Execute the `playback` command
pub async fn run_playback(args: &PlaybackArgs) -> Result<()> {
    if !args.directory.is_dir() {
        anyhow::bail!("Recording directory not found: {}", args.directory.display());
    }

    let mut config = load_config(args.session.config.as_deref())?;
    apply_session_overrides(&mut config, &args.session)?;

    info!(
        dir = %args.directory.display(),
        fps = config.frames_per_second,
        paused = args.paused,
        "Starting playback session..."
    );

    let session_config = SessionConfig {
        manager: config,
        mode: SessionMode::Playback {
            directory: args.directory.clone(),
            descriptor: args.descriptor.clone(),
            start: args.start.clone(),
            automatic: !args.paused,
        },
        timeout: (args.session.timeout > 0).then(|| Duration::from_secs(args.session.timeout)),
        metrics_port: (args.session.metrics_port > 0).then_some(args.session.metrics_port),
    };

    let stats = Session::new(session_config)
        .run(shutdown_signal())
        .await
        .with_context(|| format!("Playback of {} failed", args.directory.display()))?;

    stats.print_summary();
    info!("IGI Syncer finished");
    Ok(())
}
