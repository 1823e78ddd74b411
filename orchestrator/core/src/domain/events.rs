// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hub events fanned out to external listeners (UI stream, logs).
//!
//! Serialized as a flat mapping: `{"type": "...", "timestamp": 1712.5, ...}`.

use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::collaborators::{AlertId, Severity};
use crate::domain::entry::{Entry, SteerUrgency};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    AgentSpawned {
        agent_id: AgentId,
        kind: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<AgentId>,
    },
    AgentStatus {
        agent_id: AgentId,
        #[serde(with = "lowercase_status")]
        status: AgentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    IterationComplete {
        agent_id: AgentId,
        iteration: u64,
    },
    AgentDone {
        agent_id: AgentId,
        reflection: String,
    },
    EntryAppended {
        agent_id: AgentId,
        entry: Entry,
    },
    SteerDelivered {
        agent_id: AgentId,
        urgency: SteerUrgency,
        source: String,
    },
    SteerDropped {
        agent_id: AgentId,
        urgency: SteerUrgency,
        source: String,
        reason: String,
    },
    AlertRaised {
        alert_id: AlertId,
        job_id: String,
        message: String,
        choices: Vec<String>,
        severity: Severity,
    },
    AlertResolved {
        alert_id: AlertId,
        response: String,
    },
    Notice {
        message: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl HubEvent {
    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Self::AgentSpawned { agent_id, .. }
            | Self::AgentStatus { agent_id, .. }
            | Self::IterationComplete { agent_id, .. }
            | Self::AgentDone { agent_id, .. }
            | Self::EntryAppended { agent_id, .. }
            | Self::SteerDelivered { agent_id, .. }
            | Self::SteerDropped { agent_id, .. } => Some(*agent_id),
            Self::AlertRaised { .. } | Self::AlertResolved { .. } | Self::Notice { .. } => None,
        }
    }
}

/// A [`HubEvent`] plus the emission timestamp (seconds since the epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    #[serde(flatten)]
    pub event: HubEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl RelayEvent {
    pub fn at(event: HubEvent, timestamp: f64) -> Self {
        Self {
            event,
            timestamp: Some(timestamp),
        }
    }
}

impl From<HubEvent> for RelayEvent {
    fn from(event: HubEvent) -> Self {
        Self {
            event,
            timestamp: None,
        }
    }
}

/// Relay payloads carry the lower-case status name (`"failed"`).
mod lowercase_status {
    use crate::domain::agent::AgentStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &AgentStatus, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(status.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AgentStatus, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
