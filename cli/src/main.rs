// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Research Hub CLI
//!
//! The `research-hub` binary hosts the agent runtime in-process.
//!
//! ## Commands
//!
//! - `research-hub run <plan.yaml>` - Spawn the agents of a plan and stream hub events
//! - `research-hub history <agent-id>` - Replay an agent's persisted entries
//! - `research-hub alerts` / `research-hub respond <alert-id> <choice>` - Answer agent alerts
//! - `research-hub config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use research_hub::commands::{self, ConfigCommand, HistoryArgs, RespondArgs, RunArgs};
use research_hub_core::domain::node_config::HubConfigManifest;

/// Research Hub - supervise cooperating research agents
#[derive(Parser)]
#[command(name = "research-hub")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "RESEARCH_HUB_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "RESEARCH_HUB_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent plan until every agent terminates
    #[command(name = "run")]
    Run(RunArgs),

    /// Show the persisted entries of an agent
    #[command(name = "history")]
    History(HistoryArgs),

    /// List alerts waiting for an answer
    #[command(name = "alerts")]
    Alerts,

    /// Answer a pending alert
    #[command(name = "respond")]
    Respond(RespondArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // `config` commands report load errors themselves
    let manifest = match &cli.command {
        Some(Commands::Config { .. }) | None => None,
        Some(_) => Some(
            HubConfigManifest::load_or_default(cli.config.clone())
                .context("Failed to load configuration")?,
        ),
    };

    let logging = manifest
        .as_ref()
        .map(|m| m.logging())
        .unwrap_or_else(|| HubConfigManifest::default().logging());
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format)?;

    if let Some(metrics) = manifest.as_ref().and_then(|m| m.metrics()) {
        init_metrics(metrics.port)?;
    }

    match (cli.command, manifest) {
        (Some(Commands::Run(args)), Some(manifest)) => commands::run::execute(args, manifest).await,
        (Some(Commands::History(args)), Some(manifest)) => {
            commands::history::execute(args, &manifest).await
        }
        (Some(Commands::Alerts), Some(manifest)) => commands::respond::list(&manifest).await,
        (Some(Commands::Respond(args)), Some(manifest)) => {
            commands::respond::execute(args, &manifest).await
        }
        (Some(Commands::Config { command }), _) => {
            commands::config::handle_command(command, cli.config).await
        }
        _ => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

/// Serve Prometheus metrics on `0.0.0.0:<port>/metrics`.
fn init_metrics(port: u16) -> Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%addr, "Metrics exporter listening");
    Ok(())
}
