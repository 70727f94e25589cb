//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// IGI Syncer - time-synchronised acquisition, recording and playback of
/// tracking and video devices
#[derive(Parser, Debug)]
#[command(
    name = "igi-syncer",
    author,
    version,
    about = "Multi-device data source manager",
    long_about = "Acquires timestamped items from several devices, resolves them against a \n\
                  common tick clock, records them to disk and plays recordings back."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "IGI_SYNCER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "IGI_SYNCER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire from the configured devices, optionally recording
    Live(LiveArgs),

    /// Play a recording back
    Playback(PlaybackArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and device information
    Info(InfoArgs),
}

/// Options shared by the session commands
#[derive(Parser, Debug, Clone)]
pub struct SessionArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "IGI_SYNCER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the tick rate from configuration (Hz)
    #[arg(long, env = "IGI_SYNCER_FPS")]
    pub fps: Option<u32>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "IGI_SYNCER_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "IGI_SYNCER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `live` command
#[derive(Parser, Debug, Clone)]
pub struct LiveArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Add a source from a factory (repeatable), after the configured ones
    #[arg(short, long = "source", value_name = "FACTORY")]
    pub sources: Vec<String>,

    /// Record every source for the whole session
    #[arg(long)]
    pub record: bool,

    /// Session directory (defaults to a time-stamped one under the recording root)
    #[arg(long, requires = "record")]
    pub record_dir: Option<PathBuf>,

    /// Override the recording root from configuration
    #[arg(long, env = "IGI_SYNCER_RECORDING_ROOT")]
    pub recording_root: Option<PathBuf>,

    /// Validate configuration and exit without acquiring
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `playback` command
#[derive(Parser, Debug, Clone)]
pub struct PlaybackArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Session directory to play back
    pub directory: PathBuf,

    /// Descriptor file (defaults to `<directory>/descriptor.toml`)
    #[arg(long)]
    pub descriptor: Option<PathBuf>,

    /// Start time, as a raw nanosecond timestamp
    #[arg(long)]
    pub start: Option<String>,

    /// Hold the start time instead of advancing one tick per tick
    #[arg(long)]
    pub paused: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "igi-syncer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the properties of every configured source
    #[arg(long)]
    pub properties: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
