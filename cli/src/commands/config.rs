// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use research_hub_core::domain::node_config::{HubConfigManifest, StorageBackend};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./research-hub.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = HubConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. RESEARCH_HUB_CONFIG: {}",
            std::env::var("RESEARCH_HUB_CONFIG")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./research-hub.yaml");
        println!("  4. ~/.research-hub/config.yaml");
        println!("  5. /etc/research-hub/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Storage:".bold());
    match spec.storage.backend {
        StorageBackend::File => println!("  Backend: file ({})", spec.storage.root_dir.display()),
        StorageBackend::Memory => println!("  Backend: memory (nothing persisted)"),
    }
    println!();

    println!("{}", "Runtime:".bold());
    println!("  Steer buffer capacity: {}", spec.runtime.steer_buffer_capacity);
    println!("  Message batch: {}", spec.runtime.message_batch);
    println!("  Idle tick: {} ms", spec.runtime.idle_tick_ms);
    println!("  Default grace period: {} s", spec.runtime.default_grace_period_secs);
    println!("  Memory view capacity: {}", spec.runtime.memory_view_capacity);
    println!("  Retention of terminated agents: {} s", spec.runtime.retention_secs);
    println!();

    println!("{}", "Event relay:".bold());
    println!("  Capacity: {} (trimmed to {})", spec.relay.capacity, spec.relay.trim_to);
    println!();

    println!("{}", "Collaborators:".bold());
    println!(
        "  Status endpoint: {}",
        spec.status.endpoint.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Alert response dir: {}",
        spec.alerts
            .response_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();

    println!("{}", "Decision models:".bold());
    if spec.models.is_empty() {
        println!("  {}", "(none; research agents need a script)".dimmed());
    }
    for model in &spec.models {
        println!("  {} → {} ({})", model.name.bold(), model.model, model.endpoint);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = HubConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let manifest = HubConfigManifest::from_yaml_str(template).unwrap();
            manifest.validate().unwrap();
        }
    }
}
