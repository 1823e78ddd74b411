// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Sidecar Agent
//
// Passively tails the log of an external process (usually a sibling
// executor's training run) and turns matching lines into alerts. A human
// answer of "stop" stops the watched agent.

use crate::application::agent::{AgentBehavior, StepContext, StepResult};
use crate::application::agents::parse_params;
use crate::domain::agent::{AgentId, AgentSpec};
use crate::domain::collaborators::Severity;
use crate::domain::entry::{EntryType, Scope};
use crate::domain::runtime::{AgentError, RuntimeError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct AlertPattern {
    pub pattern: String,
    /// Alert text; defaults to the matched line
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarParams {
    pub log_path: PathBuf,
    pub patterns: Vec<AlertPattern>,
    #[serde(default = "default_choices")]
    pub choices: Vec<String>,
    /// Agent to stop when a human answers "stop"
    #[serde(default)]
    pub target: Option<AgentId>,
    #[serde(default)]
    pub wait_for_response_secs: Option<u64>,
    /// Marker line that ends monitoring
    #[serde(default)]
    pub until: Option<String>,
}

fn default_choices() -> Vec<String> {
    vec!["continue".to_string(), "stop".to_string()]
}

struct CompiledPattern {
    regex: Regex,
    message: Option<String>,
    severity: Severity,
}

pub struct SidecarAgent {
    params: SidecarParams,
    patterns: Vec<CompiledPattern>,
    until: Option<Regex>,
    offset: u64,
    partial: String,
    alerts_raised: usize,
}

enum LineOutcome {
    Continue,
    Finished(String),
}

impl SidecarAgent {
    pub fn from_spec(spec: &AgentSpec) -> Result<Self, RuntimeError> {
        let params: SidecarParams = parse_params(spec)?;
        if params.patterns.is_empty() {
            return Err(RuntimeError::SpawnValidation(
                "sidecar params.patterns cannot be empty".into(),
            ));
        }
        let patterns = params
            .patterns
            .iter()
            .map(|p| {
                Ok(CompiledPattern {
                    regex: compile(&p.pattern)?,
                    message: p.message.clone(),
                    severity: p.severity,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;
        let until = params.until.as_deref().map(compile).transpose()?;

        Ok(Self {
            params,
            patterns,
            until,
            offset: 0,
            partial: String::new(),
            alerts_raised: 0,
        })
    }

    /// Complete lines appended since the last read. A shrunken file is
    /// treated as rotated and read from the start.
    async fn read_new_lines(&mut self) -> Result<Vec<String>, AgentError> {
        let mut file = match tokio::fs::File::open(&self.params.log_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        if len < self.offset {
            debug!(path = ?self.params.log_path, "Watched log shrank; rereading from start");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut chunk).await?;
        self.offset += chunk.len() as u64;

        self.partial.push_str(&String::from_utf8_lossy(&chunk));
        let mut lines = Vec::new();
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(lines)
    }

    async fn handle_line(&mut self, ctx: &StepContext, line: &str) -> Result<LineOutcome, AgentError> {
        if self.until.as_ref().is_some_and(|re| re.is_match(line)) {
            return Ok(LineOutcome::Finished(format!(
                "monitoring ended at marker after {} alert(s)",
                self.alerts_raised
            )));
        }

        let Some(pattern) = self.patterns.iter().find(|p| p.regex.is_match(line)) else {
            return Ok(LineOutcome::Continue);
        };
        let message = pattern.message.clone().unwrap_or_else(|| line.to_string());
        let severity = pattern.severity;
        self.alerts_raised += 1;

        let job_id = ctx
            .info()
            .job_id
            .clone()
            .unwrap_or_else(|| ctx.agent_id().to_string());
        let alert_id = ctx
            .collaborators()
            .alerts
            .trigger_alert(&job_id, &message, &self.params.choices, severity)
            .await;

        info!(agent_id = %ctx.agent_id(), alert_id = ?alert_id, "Sidecar matched: {}", line);
        ctx.record(
            EntryType::Status,
            Scope::Subtree,
            serde_json::json!({
                "alert": message,
                "line": line,
                "severity": severity,
                "alert_id": alert_id,
            }),
        )?;

        let Some(alert_id) = alert_id else {
            return Ok(LineOutcome::Continue);
        };
        let Some(wait_secs) = self.params.wait_for_response_secs else {
            ctx.collaborators().responses.release(&alert_id).await;
            return Ok(LineOutcome::Continue);
        };
        let answer = ctx
            .collaborators()
            .responses
            .wait_for_response(&alert_id, Duration::from_secs(wait_secs))
            .await;

        match answer.as_deref() {
            Some("stop") => match self.params.target {
                Some(target) => {
                    info!(agent_id = %ctx.agent_id(), target = %target, "Operator asked to stop watched agent");
                    ctx.request_stop(target);
                    Ok(LineOutcome::Finished(format!(
                        "stopped {} on operator request: {}",
                        target, message
                    )))
                }
                None => Ok(LineOutcome::Finished(format!(
                    "operator asked to stop: {}",
                    message
                ))),
            },
            Some(other) => {
                debug!(agent_id = %ctx.agent_id(), answer = other, "Alert answered; continuing");
                Ok(LineOutcome::Continue)
            }
            None => Ok(LineOutcome::Continue),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, RuntimeError> {
    Regex::new(pattern)
        .map_err(|e| RuntimeError::SpawnValidation(format!("invalid sidecar pattern '{}': {}", pattern, e)))
}

#[async_trait]
impl AgentBehavior for SidecarAgent {
    async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError> {
        let lines = self.read_new_lines().await?;
        if lines.is_empty() {
            return Ok(StepResult::Idle);
        }
        for line in &lines {
            if let LineOutcome::Finished(reflection) = self.handle_line(ctx, line).await? {
                ctx.report(
                    EntryType::Result,
                    serde_json::json!({ "alerts": self.alerts_raised, "summary": reflection }),
                )?;
                return Ok(StepResult::Done { reflection });
            }
        }
        Ok(StepResult::Progress)
    }
}
