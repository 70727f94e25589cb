//! `live` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use super::{apply_session_overrides, load_config, shutdown_signal};
use crate::cli::LiveArgs;
use crate::pipeline::{Session, SessionConfig, SessionMode};

/// Execute the `live` command
pub async fn run_live(args: &LiveArgs) -> Result<()> {
    let mut config = load_config(args.session.config.as_deref())?;

    if let Some(ref root) = args.recording_root {
        info!(root = %root.display(), "Overriding recording root from CLI");
        config.recording_root = Some(root.clone());
    }
    apply_session_overrides(&mut config, &args.session)?;

    info!(
        fps = config.frames_per_second,
        configured_sources = config.sources.len(),
        extra_sources = args.sources.len(),
        record = args.record,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config, args);
        return Ok(());
    }

    let session_config = SessionConfig {
        manager: config,
        mode: SessionMode::Live {
            extra_sources: args.sources.clone(),
            record: args.record,
            record_dir: args.record_dir.clone(),
        },
        timeout: (args.session.timeout > 0).then(|| Duration::from_secs(args.session.timeout)),
        metrics_port: (args.session.metrics_port > 0).then_some(args.session.metrics_port),
    };

    info!("Starting live session...");
    let stats = Session::new(session_config)
        .run(shutdown_signal())
        .await
        .context("Live session failed")?;

    stats.print_summary();
    info!("IGI Syncer finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::ManagerConfig, args: &LiveArgs) {
    println!("\n=== Configuration Summary ===\n");
    println!("Manager:");
    println!("  Tick rate: {} Hz", config.frames_per_second);
    println!("  Slider resolution: {}", config.slider_resolution);
    match config.recording_root {
        Some(ref root) => println!("  Recording root: {}", root.display()),
        None => println!(
            "  Recording root: {} (default)",
            source_manager::default_recording_root().display()
        ),
    }

    println!(
        "\nSources ({}):",
        config.sources.len() + args.sources.len()
    );
    for entry in &config.sources {
        let name = entry.config.name.as_deref().unwrap_or("(auto)");
        println!(
            "  - {} from {} (tolerance {} ns)",
            name,
            entry.factory,
            entry.config.tolerance_ns()
        );
    }
    for factory in &args.sources {
        println!("  - (auto) from {} (command line)", factory);
    }

    if args.record {
        println!("\nRecording:");
        match args.record_dir {
            Some(ref dir) => println!("  Directory: {}", dir.display()),
            None => println!("  Directory: new session under the recording root"),
        }
    }

    println!();
}
