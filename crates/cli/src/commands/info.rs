//! `info` command implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::{ManagerConfig, SystemClock};
use serde::Serialize;
use source_manager::FactoryRegistry;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    manager: ManagerInfo,
    factories: Vec<FactoryInfo>,
    sources: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct ManagerInfo {
    frames_per_second: u32,
    tick_period_ms: f64,
    slider_resolution: u32,
    event_queue_capacity: usize,
    recording_root: String,
}

#[derive(Serialize)]
struct FactoryInfo {
    display_name: String,
    device_type: String,
    needs_startup_config: bool,
}

#[derive(Serialize)]
struct SourceInfo {
    factory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    tolerance_ns: u64,
    save_on_receipt: bool,
    save_in_background: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!("Loading configuration info");

    let config = load_config(args.config.as_deref())?;
    let registry = FactoryRegistry::new(devices::default_factories(Arc::new(SystemClock)))
        .context("Failed to register device factories")?;

    let info = build_config_info(&config, &registry, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(
    config: &ManagerConfig,
    registry: &FactoryRegistry,
    args: &InfoArgs,
) -> ConfigInfo {
    let recording_root = config
        .recording_root
        .clone()
        .unwrap_or_else(source_manager::default_recording_root);

    let factories = registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(name).ok())
        .map(|factory| FactoryInfo {
            display_name: factory.display_name().to_string(),
            device_type: factory.device_type().to_string(),
            needs_startup_config: factory.needs_startup_config(),
        })
        .collect();

    let sources = config
        .sources
        .iter()
        .map(|entry| SourceInfo {
            factory: entry.factory.clone(),
            name: entry.config.name.clone(),
            tolerance_ns: entry.config.tolerance_ns(),
            save_on_receipt: entry.config.save_on_receipt,
            save_in_background: entry.config.save_in_background,
            properties: if args.properties {
                entry.config.properties.clone()
            } else {
                BTreeMap::new()
            },
        })
        .collect();

    ConfigInfo {
        manager: ManagerInfo {
            frames_per_second: config.frames_per_second,
            tick_period_ms: config.tick_period_ns() as f64 / contracts::NANOS_PER_MILLI as f64,
            slider_resolution: config.slider_resolution,
            event_queue_capacity: config.event_queue_capacity,
            recording_root: recording_root.display().to_string(),
        },
        factories,
        sources,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               IGI Syncer Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let manager = &info.manager;
    println!("Manager");
    println!(
        "   ├─ Tick rate: {} Hz ({:.2} ms)",
        manager.frames_per_second, manager.tick_period_ms
    );
    println!("   ├─ Slider resolution: {}", manager.slider_resolution);
    println!("   ├─ Event queue: {}", manager.event_queue_capacity);
    println!("   └─ Recording root: {}", manager.recording_root);

    println!("\nFactories ({})", info.factories.len());
    for (i, factory) in info.factories.iter().enumerate() {
        let prefix = if i == info.factories.len() - 1 { "└─" } else { "├─" };
        let startup = if factory.needs_startup_config {
            ", needs startup config"
        } else {
            ""
        };
        println!(
            "   {} {} ({}{})",
            prefix, factory.display_name, factory.device_type, startup
        );
    }

    println!("\nSources ({})", info.sources.len());
    for (i, source) in info.sources.iter().enumerate() {
        let is_last = i == info.sources.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} from {}",
            prefix,
            source.name.as_deref().unwrap_or("(auto)"),
            source.factory
        );
        println!(
            "   {}  tolerance {} ns, save on receipt: {}, background: {}",
            child_prefix, source.tolerance_ns, source.save_on_receipt, source.save_in_background
        );
        for (key, value) in &source.properties {
            println!("   {}  {} = {}", child_prefix, key, value);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SourceConfig, SourceEntryConfig};

    #[test]
    fn test_build_config_info() {
        let mut properties = BTreeMap::new();
        properties.insert("rate_hz".to_string(), "120".to_string());
        let config = ManagerConfig {
            frames_per_second: 40,
            sources: vec![SourceEntryConfig {
                factory: "Mock Tracker".into(),
                config: SourceConfig {
                    properties,
                    ..Default::default()
                },
            }],
            ..Default::default()
        };
        let registry =
            FactoryRegistry::new(devices::default_factories(Arc::new(SystemClock))).unwrap();
        let args = InfoArgs {
            config: None,
            json: true,
            properties: false,
        };

        let info = build_config_info(&config, &registry, &args);
        assert!((info.manager.tick_period_ms - 25.0).abs() < 1e-9);
        assert_eq!(info.factories.len(), 2);
        assert!(info.factories.iter().any(|f| f.device_type == "mock_frame_grabber"
            && f.needs_startup_config));
        assert!(info.sources[0].properties.is_empty());
    }
}
