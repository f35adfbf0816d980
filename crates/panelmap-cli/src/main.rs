//! Panelmap - Mapping definition tool
//!
//! Loads the configured mapping tiers and reports on them, resolves a device
//! component context to its mapping, and runs transformers on values.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use panelmap_core::{ComponentType, DeviceCategory};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "panelmap")]
#[command(about = "Check and exercise device-to-panel mapping definitions")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "panelmap.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), defaults to the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every mapping tier and report per-file results
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find the mapping for a device component
    Resolve {
        /// Component type (switch, cover, light, ...)
        #[arg(long, value_parser = parse_component)]
        component: ComponentType,
        /// Component index on the device
        #[arg(long, default_value_t = 0)]
        key: u32,
        /// Device category (generic, lighting, outlet, ...)
        #[arg(long, value_parser = parse_category, default_value = "generic")]
        category: DeviceCategory,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        /// Print the resolved mapping as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a transformer on a value
    Transform {
        /// Transformer name
        name: String,
        /// Input value (number, true/false, string or JSON)
        value: String,
        /// Convert panel to device instead of device to panel
        #[arg(long)]
        write: bool,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_component(value: &str) -> Result<ComponentType, String> {
    ComponentType::from_name(value).ok_or_else(|| format!("unknown component type '{}'", value))
}

fn parse_category(value: &str) -> Result<DeviceCategory, String> {
    DeviceCategory::from_name(value).ok_or_else(|| format!("unknown device category '{}'", value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load_config(&args.config)?;

    // Initialize logging
    let level_name = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        path = %args.config.display(),
        found = args.config.exists(),
        "Panelmap v{}",
        env!("CARGO_PKG_VERSION")
    );

    match args.command {
        Command::Check { json } => commands::check(&config, json),
        Command::Resolve {
            component,
            key,
            category,
            model,
            profile,
            json,
        } => commands::resolve(&config, component, key, category, model, profile, json),
        Command::Transform { name, value, write } => commands::transform(&config, &name, &value, write),
        Command::InitConfig { force } => {
            if args.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite",
                    args.config.display()
                );
            }
            config::save_default_config(&args.config)?;
            println!("Wrote default configuration to {}", args.config.display());
            Ok(())
        }
    }
}
