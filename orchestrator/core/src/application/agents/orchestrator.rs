// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Orchestrator Agent
//!
//! Spawns the children listed in its params, hands them a directive once
//! every spawn has been answered, and waits for each child to report back.
//!
//! ```text
//! slot:  Spawning ─► Running ─► Succeeded
//!            │          │
//!            └──────────┴─► (attempts < max) ─► Spawning
//!                       └─► Failed
//! ```
//!
//! A child reports through a RESULT entry or an ERROR entry. A RESULT
//! carrying `"success": false` counts as a failure, as does an ERROR unless
//! it says `"stopped": true` (a stopped child is never retried). Anything
//! the replaced attempt sends afterwards no longer matches a running slot
//! and is ignored. Once every slot is settled the orchestrator reports an
//! aggregated RESULT to its own parent and finishes.

use crate::application::agent::{AgentBehavior, StepContext, StepResult};
use crate::application::agents::parse_params;
use crate::domain::agent::{AgentId, AgentSpec};
use crate::domain::entry::{Entry, EntryType, Scope};
use crate::domain::ipc::SpawnResponse;
use crate::domain::runtime::{AgentError, RuntimeError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorParams {
    pub children: Vec<AgentSpec>,
    /// Broadcast to the subtree once all children are up
    #[serde(default)]
    pub directive: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub fail_on_child_failure: bool,
}

fn default_max_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Spawning(Uuid),
    Running(AgentId),
    Succeeded { agent: AgentId, result: serde_json::Value },
    Failed { error: String },
}

#[derive(Debug)]
struct Slot {
    spec: AgentSpec,
    attempts: u32,
    state: SlotState,
}

impl Slot {
    fn is_settled(&self) -> bool {
        matches!(self.state, SlotState::Succeeded { .. } | SlotState::Failed { .. })
    }

    fn label(&self) -> String {
        self.spec
            .name
            .clone()
            .unwrap_or_else(|| self.spec.kind.clone())
    }
}

pub struct OrchestratorAgent {
    params: OrchestratorParams,
    slots: Vec<Slot>,
    directive_sent: bool,
}

impl OrchestratorAgent {
    pub fn from_spec(spec: &AgentSpec) -> Result<Self, RuntimeError> {
        let params: OrchestratorParams = parse_params(spec)?;
        if params.children.is_empty() {
            return Err(RuntimeError::SpawnValidation(
                "orchestrator params.children cannot be empty".into(),
            ));
        }
        if params.max_attempts == 0 {
            return Err(RuntimeError::SpawnValidation(
                "orchestrator params.max_attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            params,
            slots: Vec::new(),
            directive_sent: false,
        })
    }

    fn launch(ctx: &StepContext, slot: &mut Slot) {
        let mut spec = slot.spec.clone();
        if spec.job_id.is_none() {
            spec.job_id = ctx.info().job_id.clone();
        }
        slot.attempts += 1;
        slot.state = SlotState::Spawning(ctx.request_spawn(spec));
    }

    fn slot_for_child(&mut self, child: AgentId) -> Option<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|slot| slot.state == SlotState::Running(child))
    }

    fn retry_or_fail(ctx: &StepContext, slot: &mut Slot, error: String, retryable: bool, max_attempts: u32) {
        if retryable && slot.attempts < max_attempts {
            warn!(
                agent_id = %ctx.agent_id(),
                child = %slot.label(),
                attempt = slot.attempts,
                error = %error,
                "Child failed; retrying"
            );
            Self::launch(ctx, slot);
        } else {
            warn!(agent_id = %ctx.agent_id(), child = %slot.label(), error = %error, "Child failed");
            slot.state = SlotState::Failed { error };
        }
    }

    fn maybe_send_directive(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
        if self.directive_sent
            || self
                .slots
                .iter()
                .any(|slot| matches!(slot.state, SlotState::Spawning(_)))
        {
            return Ok(());
        }
        self.directive_sent = true;
        if let Some(directive) = &self.params.directive {
            ctx.send_message(directive.clone(), Scope::Subtree)?;
        }
        Ok(())
    }
}

fn reports_failure(payload: &serde_json::Value) -> bool {
    payload.get("success").and_then(|v| v.as_bool()) == Some(false)
}

#[async_trait]
impl AgentBehavior for OrchestratorAgent {
    async fn on_start(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
        info!(agent_id = %ctx.agent_id(), children = self.params.children.len(), "Orchestrator spawning children");
        self.slots = self
            .params
            .children
            .iter()
            .map(|spec| Slot {
                spec: spec.clone(),
                attempts: 0,
                state: SlotState::Failed {
                    error: "not started".into(),
                },
            })
            .collect();
        for slot in &mut self.slots {
            Self::launch(ctx, slot);
        }
        Ok(())
    }

    async fn on_spawn_response(&mut self, ctx: &StepContext, response: SpawnResponse) -> Result<(), AgentError> {
        let max_attempts = self.params.max_attempts;
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.state == SlotState::Spawning(response.request_id))
        else {
            debug!(agent_id = %ctx.agent_id(), request_id = %response.request_id, "Unmatched spawn response");
            return Ok(());
        };

        match (response.agent_id, response.error) {
            (Some(child), _) => {
                debug!(agent_id = %ctx.agent_id(), child = %child, "Child spawned");
                slot.state = SlotState::Running(child);
            }
            (None, error) => {
                let error = error.unwrap_or_else(|| "spawn rejected".into());
                // A spec the runtime rejects once will be rejected again
                Self::retry_or_fail(ctx, slot, error, false, max_attempts);
            }
        }
        self.maybe_send_directive(ctx)
    }

    async fn on_message(&mut self, ctx: &StepContext, entry: Entry) -> Result<(), AgentError> {
        let max_attempts = self.params.max_attempts;
        let child = entry.agent_id;
        let Some(slot) = self.slot_for_child(child) else {
            return Ok(());
        };

        match entry.entry_type {
            EntryType::Result if reports_failure(&entry.payload) => {
                let error = entry
                    .payload
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| match entry.payload.get("exit_code").and_then(|v| v.as_i64()) {
                        Some(code) => format!("child exited with code {}", code),
                        None => "child reported an unsuccessful result".to_string(),
                    });
                Self::retry_or_fail(ctx, slot, error, true, max_attempts);
            }
            EntryType::Result => {
                info!(agent_id = %ctx.agent_id(), child = %slot.label(), "Child reported a result");
                slot.state = SlotState::Succeeded {
                    agent: child,
                    result: entry.payload,
                };
            }
            EntryType::Error => {
                let stopped = entry
                    .payload
                    .get("stopped")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let error = entry
                    .payload
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("child failed")
                    .to_string();
                Self::retry_or_fail(ctx, slot, error, !stopped, max_attempts);
            }
            _ => {}
        }
        Ok(())
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError> {
        if self.slots.is_empty() || !self.slots.iter().all(Slot::is_settled) {
            return Ok(StepResult::Idle);
        }

        let succeeded = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.state, SlotState::Succeeded { .. }))
            .count();
        let total = self.slots.len();
        let children: Vec<_> = self
            .slots
            .iter()
            .map(|slot| match &slot.state {
                SlotState::Succeeded { agent, result } => serde_json::json!({
                    "name": slot.label(),
                    "agent_id": agent,
                    "attempts": slot.attempts,
                    "success": true,
                    "result": result,
                }),
                SlotState::Failed { error } => serde_json::json!({
                    "name": slot.label(),
                    "attempts": slot.attempts,
                    "success": false,
                    "error": error,
                }),
                _ => serde_json::Value::Null,
            })
            .collect();

        ctx.report(
            EntryType::Result,
            serde_json::json!({
                "succeeded": succeeded,
                "total": total,
                "children": children,
            }),
        )?;

        if succeeded < total && self.params.fail_on_child_failure {
            return Err(AgentError::Other(format!(
                "{} of {} children failed",
                total - succeeded,
                total
            )));
        }
        Ok(StepResult::Done {
            reflection: format!("{}/{} children succeeded", succeeded, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        let empty = AgentSpec::new("orchestrator").with_params(serde_json::json!({"children": []}));
        assert!(matches!(
            OrchestratorAgent::from_spec(&empty),
            Err(RuntimeError::SpawnValidation(_))
        ));

        let zero = AgentSpec::new("orchestrator").with_params(serde_json::json!({
            "children": [{"kind": "executor"}],
            "max_attempts": 0
        }));
        assert!(OrchestratorAgent::from_spec(&zero).is_err());

        let ok = AgentSpec::new("orchestrator").with_params(serde_json::json!({
            "children": [{"kind": "executor", "name": "run-a", "params": {"command": "true"}}],
            "directive": "go"
        }));
        let agent = OrchestratorAgent::from_spec(&ok).unwrap();
        assert_eq!(agent.params.max_attempts, 1);
        assert_eq!(agent.params.children[0].name.as_deref(), Some("run-a"));
    }

    #[test]
    fn test_unsuccessful_result_counts_as_failure() {
        assert!(reports_failure(&serde_json::json!({"exit_code": 7, "success": false})));
        assert!(!reports_failure(&serde_json::json!({"exit_code": 0, "success": true})));
        assert!(!reports_failure(&serde_json::json!({"succeeded": 2, "total": 2})));
    }
}
