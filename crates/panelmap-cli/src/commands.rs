//! Subcommand handlers

use anyhow::{bail, Context, Result};
use panelmap_core::value::parse_literal;
use panelmap_core::{ComponentType, DeviceCategory, MappingContext, MappingEngine, ResolvedMapping};
use tracing::{debug, warn};

use crate::config::Config;

fn load_engine(config: &Config) -> Result<MappingEngine> {
    let paths = config.mapping_paths();
    debug!(
        builtin = %paths.builtin.display(),
        user = %paths.user.display(),
        "Loading mappings"
    );
    MappingEngine::load(paths).context("Failed to initialise mapping engine")
}

/// Load every tier and print per-file results; fails when any file was skipped
pub fn check(config: &Config, json: bool) -> Result<()> {
    let engine = load_engine(config)?;
    let report = engine
        .last_report()
        .context("Load pass produced no report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for warning in &report.pass_warnings {
            println!("warning: {}", warning);
        }
        for file in &report.files {
            let status = if file.success { "ok" } else { "FAILED" };
            println!(
                "[{}] {} ({}, {} mappings)",
                status,
                file.path.display(),
                file.source,
                file.mappings
            );
            for error in &file.errors {
                println!("    error: {}", error);
            }
            for warning in &file.warnings {
                println!("    warning: {}", warning);
            }
        }
        println!(
            "{} files loaded, {} failed, {} mappings, {} warnings",
            report.files_loaded, report.files_failed, report.mappings_loaded, report.warnings
        );
    }

    if report.files_failed > 0 {
        bail!("{} mapping file(s) failed to load", report.files_failed);
    }
    Ok(())
}

/// Resolve a component context and print the interpolated mapping
pub fn resolve(
    config: &Config,
    component: ComponentType,
    key: u32,
    category: DeviceCategory,
    model: Option<String>,
    profile: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = load_engine(config)?;

    let mut context = MappingContext::new(component, key, category);
    if let Some(model) = model {
        context = context.with_model(model);
    }
    if let Some(profile) = profile {
        context = context.with_profile(profile);
    }

    let Some(mapping) = engine.find(&context) else {
        warn!(context = %context.cache_key(), "No mapping matched");
        bail!("no mapping matches {}", context.cache_key());
    };

    let mapping = interpolated(&engine, &mapping, &context);
    if json {
        println!("{}", serde_json::to_string_pretty(&mapping)?);
        return Ok(());
    }

    println!("{} (priority {})", mapping.name, mapping.priority);
    if let Some(description) = &mapping.description {
        println!("  {}", description);
    }
    for channel in &mapping.channels {
        println!(
            "  channel {} [{}]{}",
            channel.identifier,
            channel.category,
            channel.name.as_deref().map(|n| format!(" \"{}\"", n)).unwrap_or_default()
        );
        for property in &channel.properties {
            let transformer = engine.transformer_for(property);
            println!(
                "    {} <- {} ({}, {}{})",
                property.panel.identifier,
                property.source_field_name,
                property.panel.data_type,
                property.direction,
                if transformer.is_identity() { "" } else { ", transformed" }
            );
        }
        for property in &channel.static_properties {
            println!("    {} = {}", property.identifier, property.value);
        }
        for property in &channel.derived_properties {
            let rule = property
                .derivation_name
                .as_deref()
                .or(property.rule.as_ref().map(|r| r.kind()))
                .unwrap_or("none");
            println!(
                "    {} derived from {} via {}",
                property.identifier, property.source_property, rule
            );
        }
    }
    Ok(())
}

/// Copy of the mapping with channel identifiers and names interpolated
fn interpolated(engine: &MappingEngine, mapping: &ResolvedMapping, context: &MappingContext) -> ResolvedMapping {
    let mut mapping = mapping.clone();
    for channel in &mut mapping.channels {
        channel.identifier = engine.interpolate(&channel.identifier, context);
        channel.name = channel.name.as_deref().map(|n| engine.interpolate(n, context));
        channel.parent_identifier = channel
            .parent_identifier
            .as_deref()
            .map(|p| engine.interpolate(p, context));
        for property in &mut channel.properties {
            property.panel.name = property.panel.name.as_deref().map(|n| engine.interpolate(n, context));
        }
    }
    mapping
}

/// Run a registered transformer over a literal value
pub fn transform(config: &Config, name: &str, raw: &str, write: bool) -> Result<()> {
    let engine = load_engine(config)?;

    let Some(transformer) = engine.catalog().transformers.try_get(name) else {
        bail!("unknown transformer '{}'", name);
    };

    let input = parse_literal(raw);
    let output = if write {
        if !transformer.can_write() {
            warn!(transformer = name, "Transformer is not writable, value passes through");
        }
        transformer.write(&input)
    } else {
        if !transformer.can_read() {
            warn!(transformer = name, "Transformer is not readable, value passes through");
        }
        transformer.read(&input)
    };

    println!("{}", output);
    Ok(())
}
