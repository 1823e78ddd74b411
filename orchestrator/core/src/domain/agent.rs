// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Identity & Lifecycle
//!
//! Identity, spawn specification and the lifecycle state machine shared by
//! every agent variant.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING ──► RUNNING ◄──► PAUSED
//!                │            │
//!                ▼            ▼
//!          DONE | FAILED | STOPPED   (terminal, irreversible)
//! ```
//!
//! A `PENDING` agent may also go straight to `FAILED` or `STOPPED` when it is
//! torn down before its first step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Pending,
    Running,
    Paused,
    Done,
    Failed,
    Stopped,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Stopped)
    }

    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Failed) | (Pending, Stopped) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Done) | (Running, Failed) | (Running, Stopped) => true,
            (Paused, Done) | (Paused, Failed) | (Paused, Stopped) => true,
            _ => false,
        }
    }

    /// Lower-case name used in relay payloads (`"status": "failed"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: AgentStatus,
    pub to: AgentStatus,
}

/// Lifecycle state of one agent.
///
/// Owned by exactly one writer at a time: the runtime while the agent is
/// being constructed, then the agent's worker task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLifecycle {
    status: AgentStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AgentLifecycle {
    pub fn new() -> Self {
        Self {
            status: AgentStatus::Pending,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn transition(&mut self, next: AgentStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        if next == AgentStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }
}

impl Default for AgentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller asks the runtime to start.
///
/// `kind` is resolved against the agent registry at spawn time; `params` is
/// opaque to the runtime and validated by the variant's constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<AgentId>,

    /// External job the agent reports status for (run id, sweep id...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(default)]
    pub params: serde_json::Value,
}

impl AgentSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            parent: None,
            job_id: None,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent: AgentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Static metadata for a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub kind: String,
    pub name: String,
    pub parent: Option<AgentId>,
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentInfo {
    pub fn from_spec(id: AgentId, spec: &AgentSpec) -> Self {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", spec.kind, &id.to_string()[..8]));
        Self {
            id,
            kind: spec.kind.clone(),
            name,
            parent: spec.parent,
            job_id: spec.job_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Point-in-time view of an agent for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    #[serde(flatten)]
    pub info: AgentInfo,
    pub status: AgentStatus,
}
