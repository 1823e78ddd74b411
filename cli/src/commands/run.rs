// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `research-hub run` - host the runtime for one plan
//!
//! A plan is a YAML list of agent specs spawned as roots:
//!
//! ```yaml
//! agents:
//!   - kind: orchestrator
//!     name: lr-sweep
//!     job_id: sweep-17
//!     params:
//!       directive: "report val loss when done"
//!       children:
//!         - kind: executor
//!           params: { command: python, args: [train.py, --lr, "3e-4"] }
//! timeout_secs: 3600
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use research_hub_core::domain::agent::{AgentSnapshot, AgentSpec, AgentStatus};
use research_hub_core::domain::events::{HubEvent, RelayEvent};
use research_hub_core::domain::node_config::HubConfigManifest;
use research_hub_core::infrastructure::event_relay::RelayError;
use research_hub_core::RuntimeBuilder;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan YAML file
    #[arg(value_name = "PLAN")]
    pub plan: PathBuf,

    /// Stop every agent after this many seconds (overrides the plan)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print raw relay events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Hide ENTRY_APPENDED events
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunPlan {
    pub agents: Vec<AgentSpec>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RunPlan {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let plan: RunPlan = serde_yaml::from_str(yaml).context("Invalid plan YAML")?;
        if plan.agents.is_empty() {
            anyhow::bail!("Plan lists no agents");
        }
        Ok(plan)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {:?}", path))?;
        Self::from_yaml_str(&content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Interrupted,
    TimedOut,
}

pub async fn execute(args: RunArgs, manifest: HubConfigManifest) -> Result<()> {
    let plan = RunPlan::from_file(&args.plan)?;
    let runtime = RuntimeBuilder::from_config(&manifest.spec)
        .context("Failed to build runtime")?
        .build();
    let mut events = runtime.relay().subscribe();
    runtime.start();

    for spec in plan.agents {
        let kind = spec.kind.clone();
        let agent_id = runtime
            .spawn(spec)
            .with_context(|| format!("Failed to spawn {} agent", kind))?;
        println!("{} {} ({})", "Spawned".green(), agent_id, kind);
    }

    let deadline = args
        .timeout
        .or(plan.timeout_secs)
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, args.json, args.quiet),
                Err(RelayError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
                Err(RelayError::Closed) => break Outcome::Finished,
                Err(RelayError::Empty) => {}
            },
            _ = &mut ctrl_c => break Outcome::Interrupted,
            _ = ticker.tick() => {
                if runtime.all_terminal() {
                    break Outcome::Finished;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break Outcome::TimedOut;
                }
            }
        }
    };

    match outcome {
        Outcome::Finished => info!("All agents terminated"),
        Outcome::Interrupted => println!("{}", "Interrupted; stopping agents...".yellow()),
        Outcome::TimedOut => println!("{}", "Plan timed out; stopping agents...".yellow()),
    }
    runtime.shutdown(runtime.default_grace_period()).await;

    while let Ok(event) = events.try_recv() {
        print_event(&event, args.json, args.quiet);
    }

    let agents = runtime.agents();
    print_summary(&agents);

    let failed = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} agent(s) failed", failed);
    }
    if outcome == Outcome::TimedOut {
        anyhow::bail!("Plan did not finish before the timeout");
    }
    Ok(())
}

fn print_event(event: &RelayEvent, json: bool, quiet: bool) {
    if quiet && matches!(event.event, HubEvent::EntryAppended { .. }) {
        return;
    }
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
        return;
    }
    let time = event
        .timestamp
        .and_then(|ts| chrono::DateTime::from_timestamp_micros((ts * 1_000_000.0) as i64))
        .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_default();
    println!("{} {}", time.dimmed(), describe(&event.event));
}

/// One-line human rendering of a hub event.
pub fn describe(event: &HubEvent) -> String {
    match event {
        HubEvent::AgentSpawned {
            agent_id,
            kind,
            name,
            parent,
        } => match parent {
            Some(parent) => format!("spawned {} {} ({}) under {}", kind, name, agent_id, parent),
            None => format!("spawned {} {} ({})", kind, name, agent_id),
        },
        HubEvent::AgentStatus {
            agent_id,
            status,
            error,
        } => match error {
            Some(error) => format!("{} -> {}: {}", agent_id, status, error),
            None => format!("{} -> {}", agent_id, status),
        },
        HubEvent::IterationComplete {
            agent_id,
            iteration,
        } => format!("{} iteration {}", agent_id, iteration),
        HubEvent::AgentDone {
            agent_id,
            reflection,
        } => format!("{} done: {}", agent_id, reflection),
        HubEvent::EntryAppended { agent_id, entry } => {
            let body = entry
                .content()
                .map(str::to_string)
                .unwrap_or_else(|| entry.payload.to_string());
            format!("{} {:?} {}", agent_id, entry.entry_type, body)
        }
        HubEvent::SteerDelivered {
            agent_id,
            urgency,
            source,
        } => format!("steer ({}, from {}) delivered to {}", urgency, source, agent_id),
        HubEvent::SteerDropped {
            agent_id,
            urgency,
            reason,
            ..
        } => format!("steer ({}) for {} dropped: {}", urgency, agent_id, reason),
        HubEvent::AlertRaised {
            alert_id,
            job_id,
            message,
            choices,
            severity,
        } => format!(
            "ALERT {} [{:?}] {}: {} (answer with `research-hub respond {} <{}>`)",
            alert_id,
            severity,
            job_id,
            message,
            alert_id,
            choices.join("|")
        ),
        HubEvent::AlertResolved { alert_id, response } => {
            format!("alert {} answered: {}", alert_id, response)
        }
        HubEvent::Notice { message, .. } => message.clone(),
    }
}

fn print_summary(agents: &[AgentSnapshot]) {
    println!();
    println!("{:<38} {:<24} {:<14} {}", "ID", "NAME", "KIND", "STATUS");
    for agent in agents {
        let status = match agent.status {
            AgentStatus::Done => agent.status.to_string().green(),
            AgentStatus::Failed => agent.status.to_string().red(),
            AgentStatus::Stopped => agent.status.to_string().yellow(),
            _ => agent.status.to_string().normal(),
        };
        println!(
            "{:<38} {:<24} {:<14} {}",
            agent.info.id,
            agent.info.name.bold(),
            agent.info.kind,
            status
        );
    }
}
