//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    frames_per_second: u32,
    source_count: usize,
    background_savers: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    frames_per_second: config.frames_per_second,
                    source_count: config.sources.len(),
                    background_savers: config
                        .sources
                        .iter()
                        .filter(|s| s.config.save_in_background)
                        .count(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &contracts::ManagerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sources.is_empty() {
        warnings.push("No sources configured - add them with `live --source`".to_string());
    }

    let known = [
        devices::MockTrackerFactory::DISPLAY_NAME,
        devices::MockFrameGrabberFactory::DISPLAY_NAME,
    ];
    for (idx, entry) in config.sources.iter().enumerate() {
        if !known.contains(&entry.factory.as_str()) {
            warnings.push(format!(
                "sources[{idx}]: factory '{}' is not built into this binary",
                entry.factory
            ));
        }

        let tick_ns = config.tick_period_ns();
        if entry.config.tolerance_ns() < tick_ns {
            warnings.push(format!(
                "sources[{idx}]: tolerance {} ns is below the tick period ({} ns)",
                entry.config.tolerance_ns(),
                tick_ns
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Tick rate: {} Hz", summary.frames_per_second);
            println!("  Sources: {}", summary.source_count);
            println!("  Background savers: {}", summary.background_savers);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
