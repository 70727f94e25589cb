//! Command implementations.

mod info;
mod live;
mod playback;
mod validate;

pub use info::run_info;
pub use live::run_live;
pub use playback::run_playback;
pub use validate::run_validate;

use std::path::Path;

use contracts::ManagerConfig;
use tracing::info;

use crate::cli::SessionArgs;
use crate::error::{CliError, Result};

/// Load the configuration file if one is given, defaults otherwise
pub(crate) fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(ManagerConfig::default());
    };

    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }

    info!(config = %path.display(), "Loading configuration");
    config_loader::ConfigLoader::load_from_path(path).map_err(CliError::Config)
}

/// Apply the overrides shared by every session command
pub(crate) fn apply_session_overrides(config: &mut ManagerConfig, args: &SessionArgs) -> Result<()> {
    if let Some(fps) = args.fps {
        info!(fps, "Overriding tick rate from CLI");
        config.frames_per_second = fps;
    }
    config_loader::ConfigLoader::validate(config).map_err(CliError::Config)
}

/// Wait for Ctrl+C or SIGTERM
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
