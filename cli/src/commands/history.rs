// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `research-hub history` - replay an agent's persisted log

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

use research_hub_core::domain::agent::AgentId;
use research_hub_core::domain::entry::{Entry, EntryType};
use research_hub_core::domain::node_config::HubConfigManifest;
use research_hub_core::infrastructure::store::StoreFactory;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Agent ID
    #[arg(value_name = "AGENT_ID")]
    pub agent_id: String,

    /// Only entries strictly after this RFC 3339 timestamp
    #[arg(long, value_name = "TIMESTAMP")]
    pub since: Option<DateTime<Utc>>,

    /// Only show the last N entries
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Print entries as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: HistoryArgs, manifest: &HubConfigManifest) -> Result<()> {
    let agent_id = AgentId::from_string(&args.agent_id)
        .with_context(|| format!("Invalid agent id: {}", args.agent_id))?;

    let stores = StoreFactory::from_config(&manifest.spec.storage);
    if matches!(stores, StoreFactory::Memory) {
        anyhow::bail!("History is only kept by the file storage backend");
    }
    let entries = stores
        .replay(agent_id)
        .with_context(|| format!("Failed to read the log of agent {}", agent_id))?
        .ok_or_else(|| anyhow::anyhow!("No log found for agent {}", agent_id))?;

    let entries = select(entries, args.since, args.limit);
    if entries.is_empty() {
        println!("{}", "No entries".yellow());
        return Ok(());
    }

    for entry in &entries {
        if args.json {
            println!("{}", serde_json::to_string(entry)?);
        } else {
            print_entry(entry);
        }
    }
    Ok(())
}

/// Entries after `since`, keeping only the last `limit`.
pub fn select(entries: Vec<Entry>, since: Option<DateTime<Utc>>, limit: Option<usize>) -> Vec<Entry> {
    let mut selected: Vec<Entry> = entries
        .into_iter()
        .filter(|e| since.is_none_or(|since| e.timestamp > since))
        .collect();
    if let Some(limit) = limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}

fn print_entry(entry: &Entry) {
    let kind = format!("{:?}", entry.entry_type).to_uppercase();
    let kind = match entry.entry_type {
        EntryType::Error => kind.red(),
        EntryType::Result => kind.green(),
        EntryType::Status | EntryType::Iteration => kind.dimmed(),
        EntryType::Message => kind.normal(),
    };
    let body = entry
        .content()
        .map(str::to_string)
        .unwrap_or_else(|| entry.payload.to_string());
    let target = entry
        .recipient
        .map(|r| format!(" -> {}", r))
        .unwrap_or_default();
    println!(
        "{} {:<9} {:?}{} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
        kind,
        entry.scope,
        target,
        body
    );
}
