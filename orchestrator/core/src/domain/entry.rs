// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Entries, Scopes & Steers
//!
//! [`Entry`] is the append-only record of something an agent did or
//! observed. [`Scope`] decides which agents may observe it. [`Steer`] is the
//! transient high-priority directive that bypasses the entry log entirely.
//!
//! ## Visibility
//!
//! | Scope | Visible to |
//! |-------|-----------|
//! | `SELF` | the author only |
//! | `SUBTREE` | the author and all of its descendants |
//! | `GLOBAL` | every agent under the same runtime |
//! | `DIRECT` | the author and the single `recipient` |

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Message,
    Status,
    Iteration,
    Result,
    Error,
}

impl EntryType {
    /// Entry types that land in other agents' mailboxes.
    pub fn is_deliverable(self) -> bool {
        matches!(self, Self::Message | Self::Result | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    #[serde(rename = "SELF")]
    SelfOnly,
    Subtree,
    Global,
    Direct,
}

/// Parent/child relation used to resolve `SUBTREE` visibility.
pub trait Ancestry {
    /// `true` when `ancestor` is a strict ancestor of `agent`.
    fn is_descendant(&self, agent: AgentId, ancestor: AgentId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub agent_id: AgentId,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Entry {
    pub fn new(
        agent_id: AgentId,
        entry_type: EntryType,
        scope: Scope,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EntryId::new(),
            agent_id,
            entry_type,
            scope,
            recipient: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn direct(
        agent_id: AgentId,
        recipient: AgentId,
        entry_type: EntryType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            recipient: Some(recipient),
            ..Self::new(agent_id, entry_type, Scope::Direct, payload)
        }
    }

    /// Convenience constructor for a plain-text MESSAGE.
    pub fn message(agent_id: AgentId, scope: Scope, content: impl Into<String>) -> Self {
        Self::new(
            agent_id,
            EntryType::Message,
            scope,
            serde_json::json!({ "content": content.into() }),
        )
    }

    /// Text carried by the entry: `payload.content` if present, else a bare
    /// string payload.
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map.get("content").and_then(|v| v.as_str()),
            _ => None,
        }
    }

    pub(crate) fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_visible_to(&self, viewer: AgentId, ancestry: &impl Ancestry) -> bool {
        if self.agent_id == viewer {
            return true;
        }
        match self.scope {
            Scope::SelfOnly => false,
            Scope::Global => true,
            Scope::Subtree => ancestry.is_descendant(viewer, self.agent_id),
            Scope::Direct => self.recipient == Some(viewer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SteerUrgency {
    Low,
    Normal,
    High,
}

impl fmt::Display for SteerUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Normal => f.write_str("normal"),
            Self::High => f.write_str("high"),
        }
    }
}

/// High-priority directive delivered straight into an agent's steer buffer.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Steer {
    pub urgency: SteerUrgency,
    pub content: String,
    pub source: String,
}

impl Steer {
    pub fn new(urgency: SteerUrgency, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            urgency,
            content: content.into(),
            source: source.into(),
        }
    }

    pub fn high(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(SteerUrgency::High, content, source)
    }
}
