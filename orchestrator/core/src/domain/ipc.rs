// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Supervisor ↔ Worker Envelopes
//!
//! [`Command`] flows supervisor → worker, [`Event`] flows worker →
//! supervisor. Both are plain values: a tag plus an opaque payload mapping,
//! so they survive a process boundary as JSON. The typed constructors and
//! accessors below are conveniences over that mapping, not part of the wire
//! contract.
//!
//! ```json
//! {"type": "STEER", "payload": {"urgency": "HIGH", "content": "...", "source": "ui"}}
//! {"type": "ITERATION", "agent_id": "…", "payload": {"iteration": 3}}
//! ```

use crate::domain::agent::{AgentId, AgentSpec};
use crate::domain::entry::{Entry, Steer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type Payload = Map<String, Value>;

fn to_payload<T: Serialize>(value: &T) -> Payload {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
        Err(_) => Map::new(),
    }
}

fn from_payload<T: DeserializeOwned>(payload: &Payload) -> Option<T> {
    serde_json::from_value(Value::Object(payload.clone())).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Stop,
    Pause,
    Resume,
    Steer,
    SpawnResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub payload: Payload,
}

/// Answer to an agent's spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnResponse {
    pub request_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Command {
    fn bare(command_type: CommandType) -> Self {
        Self {
            command_type,
            payload: Map::new(),
        }
    }

    pub fn stop() -> Self {
        Self::bare(CommandType::Stop)
    }

    pub fn pause() -> Self {
        Self::bare(CommandType::Pause)
    }

    pub fn resume() -> Self {
        Self::bare(CommandType::Resume)
    }

    pub fn steer(steer: &Steer) -> Self {
        Self {
            command_type: CommandType::Steer,
            payload: to_payload(steer),
        }
    }

    pub fn spawn_response(response: &SpawnResponse) -> Self {
        Self {
            command_type: CommandType::SpawnResponse,
            payload: to_payload(response),
        }
    }

    pub fn as_steer(&self) -> Option<Steer> {
        match self.command_type {
            CommandType::Steer => from_payload(&self.payload),
            _ => None,
        }
    }

    pub fn as_spawn_response(&self) -> Option<SpawnResponse> {
        match self.command_type {
            CommandType::SpawnResponse => from_payload(&self.payload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Started,
    Paused,
    Resumed,
    Done,
    Failed,
    Stopped,
    SpawnRequest,
    StopRequest,
    Iteration,
    LogEntry,
}

impl EventType {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub agent_id: AgentId,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Serialize, Deserialize)]
struct SpawnRequestPayload {
    request_id: Uuid,
    spec: AgentSpec,
}

impl Event {
    fn bare(event_type: EventType, agent_id: AgentId) -> Self {
        Self {
            event_type,
            agent_id,
            payload: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn started(agent_id: AgentId) -> Self {
        Self::bare(EventType::Started, agent_id)
    }

    pub fn paused(agent_id: AgentId) -> Self {
        Self::bare(EventType::Paused, agent_id)
    }

    pub fn resumed(agent_id: AgentId) -> Self {
        Self::bare(EventType::Resumed, agent_id)
    }

    pub fn done(agent_id: AgentId, reflection: impl Into<String>) -> Self {
        Self::bare(EventType::Done, agent_id).with("reflection", reflection.into())
    }

    pub fn failed(agent_id: AgentId, error: impl Into<String>) -> Self {
        Self::bare(EventType::Failed, agent_id).with("error", error.into())
    }

    pub fn stopped(agent_id: AgentId) -> Self {
        Self::bare(EventType::Stopped, agent_id)
    }

    pub fn iteration(agent_id: AgentId, iteration: u64) -> Self {
        Self::bare(EventType::Iteration, agent_id).with("iteration", iteration)
    }

    pub fn log_entry(agent_id: AgentId, entry: &Entry) -> Self {
        Self {
            event_type: EventType::LogEntry,
            agent_id,
            payload: to_payload(entry),
        }
    }

    pub fn spawn_request(agent_id: AgentId, request_id: Uuid, spec: &AgentSpec) -> Self {
        Self {
            event_type: EventType::SpawnRequest,
            agent_id,
            payload: to_payload(&SpawnRequestPayload {
                request_id,
                spec: spec.clone(),
            }),
        }
    }

    pub fn stop_request(agent_id: AgentId, target: AgentId) -> Self {
        Self::bare(EventType::StopRequest, agent_id).with("target", target.to_string())
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn reflection(&self) -> Option<&str> {
        self.str_field("reflection")
    }

    pub fn error(&self) -> Option<&str> {
        self.str_field("error")
    }

    pub fn iteration_number(&self) -> Option<u64> {
        self.payload.get("iteration").and_then(Value::as_u64)
    }

    pub fn entry(&self) -> Option<Entry> {
        match self.event_type {
            EventType::LogEntry => from_payload(&self.payload),
            _ => None,
        }
    }

    pub fn spawn_request_body(&self) -> Option<(Uuid, AgentSpec)> {
        match self.event_type {
            EventType::SpawnRequest => from_payload::<SpawnRequestPayload>(&self.payload)
                .map(|p| (p.request_id, p.spec)),
            _ => None,
        }
    }

    pub fn stop_target(&self) -> Option<AgentId> {
        self.str_field("target")
            .and_then(|s| AgentId::from_string(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entry::SteerUrgency;

    #[test]
    fn test_command_wire_shape() {
        let steer = Steer::new(SteerUrgency::High, "lower the lr", "ui");
        let value = serde_json::to_value(Command::steer(&steer)).unwrap();
        assert_eq!(value["type"], "STEER");
        assert_eq!(value["payload"]["urgency"], "HIGH");
        assert_eq!(value["payload"]["content"], "lower the lr");

        let stop = serde_json::to_value(Command::stop()).unwrap();
        assert_eq!(stop, serde_json::json!({"type": "STOP", "payload": {}}));
    }

    #[test]
    fn test_command_from_foreign_process() {
        let raw = r#"{"type":"STEER","payload":{"urgency":"LOW","content":"x","source":"peer"}}"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(command.as_steer().unwrap().urgency, SteerUrgency::Low);
        assert!(command.as_spawn_response().is_none());

        // payload is optional on the wire
        let pause: Command = serde_json::from_str(r#"{"type":"PAUSE"}"#).unwrap();
        assert_eq!(pause.command_type, CommandType::Pause);
    }

    #[test]
    fn test_event_accessors() {
        let agent = AgentId::new();
        let target = AgentId::new();

        assert_eq!(Event::iteration(agent, 7).iteration_number(), Some(7));
        assert_eq!(Event::failed(agent, "boom").error(), Some("boom"));
        assert_eq!(Event::stop_request(agent, target).stop_target(), Some(target));

        let spec = AgentSpec::new("executor").with_parent(agent);
        let request_id = Uuid::new_v4();
        let (rid, parsed) = Event::spawn_request(agent, request_id, &spec)
            .spawn_request_body()
            .unwrap();
        assert_eq!(rid, request_id);
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_event_wire_shape() {
        let agent = AgentId::new();
        let value = serde_json::to_value(Event::done(agent, "converged")).unwrap();
        assert_eq!(value["type"], "DONE");
        assert_eq!(value["agent_id"], agent.to_string());
        assert_eq!(value["payload"]["reflection"], "converged");
    }
}
