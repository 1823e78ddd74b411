// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `research-hub alerts` / `research-hub respond` - answer agent alerts from
//! another process through the alert response directory

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use research_hub_core::domain::collaborators::AlertId;
use research_hub_core::domain::node_config::HubConfigManifest;
use research_hub_core::infrastructure::{AlertDesk, PendingAlertInfo};

#[derive(Args, Debug)]
pub struct RespondArgs {
    /// Alert ID as shown by `research-hub alerts`
    #[arg(value_name = "ALERT_ID")]
    pub alert_id: String,

    /// The chosen answer (e.g. continue, stop)
    #[arg(value_name = "CHOICE")]
    pub choice: String,

    /// Answer even if the choice is not one the alert offered
    #[arg(long)]
    pub force: bool,
}

fn response_dir(manifest: &HubConfigManifest) -> Result<&Path> {
    manifest
        .spec
        .alerts
        .response_dir
        .as_deref()
        .context("spec.alerts.response_dir is not configured; alerts can only be answered in-process")
}

pub async fn list(manifest: &HubConfigManifest) -> Result<()> {
    let alerts = pending_alerts(response_dir(manifest)?)?;
    if alerts.is_empty() {
        println!("{}", "No pending alerts".yellow());
        return Ok(());
    }

    println!("{:<34} {:<10} {:<20} {}", "ALERT", "SEVERITY", "JOB", "MESSAGE");
    for alert in alerts {
        println!(
            "{:<34} {:<10} {:<20} {} [{}]",
            alert.alert_id.as_str().bold(),
            format!("{:?}", alert.severity).to_lowercase(),
            alert.job_id,
            alert.message,
            alert.choices.join("|")
        );
    }
    Ok(())
}

pub async fn execute(args: RespondArgs, manifest: &HubConfigManifest) -> Result<()> {
    let dir = response_dir(manifest)?;
    let path = write_response(dir, &AlertId(args.alert_id.clone()), &args.choice, args.force)?;
    println!(
        "{}",
        format!("✓ Answer '{}' written to {}", args.choice, path.display()).green()
    );
    Ok(())
}

/// Drop the answer file the waiting agent polls for. The alert must still be
/// pending and, unless `force`, the choice must be one it offered.
pub fn write_response(dir: &Path, alert_id: &AlertId, choice: &str, force: bool) -> Result<PathBuf> {
    let choice = choice.trim();
    if choice.is_empty() {
        anyhow::bail!("Choice cannot be empty");
    }

    let alert_path = AlertDesk::alert_path(dir, alert_id);
    let raw = std::fs::read_to_string(&alert_path)
        .with_context(|| format!("No pending alert {} in {:?}", alert_id, dir))?;
    let alert: PendingAlertInfo =
        serde_json::from_str(&raw).with_context(|| format!("Corrupt alert file {:?}", alert_path))?;
    if !force && !alert.choices.is_empty() && !alert.choices.iter().any(|c| c == choice) {
        anyhow::bail!(
            "'{}' is not a valid answer for alert {}; expected one of: {}",
            choice,
            alert_id,
            alert.choices.join(", ")
        );
    }

    let path = AlertDesk::response_path(dir, alert_id);
    std::fs::write(&path, format!("{}\n", choice))
        .with_context(|| format!("Failed to write response {:?}", path))?;
    Ok(path)
}

/// Alerts that have an alert file but no answer yet, oldest first.
pub fn pending_alerts(dir: &Path) -> Result<Vec<PendingAlertInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut alerts = Vec::new();
    for item in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = item?.path();
        let is_alert = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".alert.json"));
        if !is_alert {
            continue;
        }
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        match serde_json::from_str::<PendingAlertInfo>(&raw) {
            Ok(alert) if !AlertDesk::response_path(dir, &alert.alert_id).exists() => alerts.push(alert),
            Ok(_) => {}
            Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping unreadable alert file"),
        }
    }
    alerts.sort_by_key(|a| a.raised_at);
    Ok(alerts)
}
