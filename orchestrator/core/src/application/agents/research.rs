// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Research Agent
//
// Model-driven decision loop. Each step shows the decision model the goal,
// the most recent entries of the agent's memory view and the steers that
// arrived since the last decision, then acts on the single decision it
// returns. Steers are never lost between decisions: they queue here until
// the next call.

use crate::application::agent::{AgentBehavior, StepContext, StepResult};
use crate::application::agents::parse_params;
use crate::domain::agent::AgentSpec;
use crate::domain::entry::{Entry, EntryType, Scope, Steer};
use crate::domain::ipc::SpawnResponse;
use crate::domain::llm::{Decision, DecisionModel, DecisionRequest};
use crate::domain::runtime::{AgentError, RuntimeError};
use crate::infrastructure::llm::{ModelCatalog, ScriptedModel};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchParams {
    pub goal: String,
    /// Name of a configured model endpoint
    #[serde(default)]
    pub model: Option<String>,
    /// Fixed decisions to replay instead of calling a model
    #[serde(default)]
    pub script: Option<Vec<Decision>>,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
}

fn default_history_window() -> usize {
    20
}

fn default_max_iterations() -> u64 {
    50
}

pub struct ResearchAgent {
    params: ResearchParams,
    model: Arc<dyn DecisionModel>,
    pending_steers: Vec<Steer>,
}

impl ResearchAgent {
    pub fn from_spec(spec: &AgentSpec, catalog: &ModelCatalog) -> Result<Self, RuntimeError> {
        let params: ResearchParams = parse_params(spec)?;
        if params.goal.trim().is_empty() {
            return Err(RuntimeError::SpawnValidation(
                "research params.goal cannot be empty".into(),
            ));
        }

        let model: Arc<dyn DecisionModel> = match (&params.model, &params.script) {
            (Some(_), Some(_)) => {
                return Err(RuntimeError::SpawnValidation(
                    "research params accept either model or script, not both".into(),
                ))
            }
            (Some(name), None) => catalog.get(name).ok_or_else(|| {
                RuntimeError::SpawnValidation(format!(
                    "unknown model '{}' (configured: {})",
                    name,
                    catalog.names().join(", ")
                ))
            })?,
            (None, Some(script)) => Arc::new(ScriptedModel::new(script.clone())),
            (None, None) => {
                return Err(RuntimeError::SpawnValidation(
                    "research params need a model or a script".into(),
                ))
            }
        };

        Ok(Self::with_model(params, model))
    }

    pub fn with_model(params: ResearchParams, model: Arc<dyn DecisionModel>) -> Self {
        Self {
            params,
            model,
            pending_steers: Vec::new(),
        }
    }

    fn finish(&self, ctx: &StepContext, reflection: String) -> Result<StepResult, AgentError> {
        ctx.report(
            EntryType::Result,
            serde_json::json!({
                "goal": self.params.goal,
                "reflection": reflection,
                "iterations": ctx.iteration() + 1,
            }),
        )?;
        Ok(StepResult::Done { reflection })
    }
}

#[async_trait]
impl AgentBehavior for ResearchAgent {
    async fn on_start(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
        info!(agent_id = %ctx.agent_id(), model = %self.model.name(), goal = %self.params.goal, "Research agent started");
        Ok(())
    }

    async fn on_steer(&mut self, ctx: &StepContext, steer: Steer) -> Result<(), AgentError> {
        ctx.record(
            EntryType::Status,
            Scope::SelfOnly,
            serde_json::json!({
                "steer": steer.content,
                "urgency": steer.urgency,
                "source": steer.source,
            }),
        )?;
        self.pending_steers.push(steer);
        Ok(())
    }

    async fn on_message(&mut self, ctx: &StepContext, entry: Entry) -> Result<(), AgentError> {
        // Already in the memory view; the next decision sees it
        debug!(agent_id = %ctx.agent_id(), from = %entry.agent_id, "Research agent received {:?}", entry.entry_type);
        Ok(())
    }

    async fn on_spawn_response(&mut self, ctx: &StepContext, response: SpawnResponse) -> Result<(), AgentError> {
        ctx.record(
            EntryType::Status,
            Scope::SelfOnly,
            serde_json::json!({
                "spawn_request": response.request_id,
                "agent_id": response.agent_id,
                "error": response.error,
            }),
        )?;
        Ok(())
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError> {
        if ctx.iteration() >= self.params.max_iterations {
            return self.finish(
                ctx,
                format!("iteration budget of {} exhausted", self.params.max_iterations),
            );
        }

        let request = DecisionRequest {
            agent_id: ctx.agent_id(),
            goal: self.params.goal.clone(),
            iteration: ctx.iteration(),
            history: ctx.view().recent(self.params.history_window, None),
            steers: std::mem::take(&mut self.pending_steers),
        };
        let decision = self.model.decide(&request).await?;
        debug!(agent_id = %ctx.agent_id(), decision = ?decision, "Decision made");

        ctx.record(
            EntryType::Iteration,
            Scope::SelfOnly,
            serde_json::json!({
                "iteration": request.iteration,
                "decision": decision,
                "steers": request.steers.len(),
            }),
        )?;

        match decision {
            Decision::Message { content, scope } => {
                match (scope, ctx.parent()) {
                    (Scope::Direct, Some(parent)) => {
                        ctx.send_to(parent, EntryType::Message, serde_json::json!({ "content": content }))?;
                    }
                    (Scope::Direct, None) => {
                        ctx.send_message(content, Scope::Global)?;
                    }
                    (scope, _) => {
                        ctx.send_message(content, scope)?;
                    }
                }
                Ok(StepResult::Progress)
            }
            Decision::Spawn { spec } => {
                let request_id = ctx.request_spawn(spec);
                debug!(agent_id = %ctx.agent_id(), request_id = %request_id, "Requested child spawn");
                Ok(StepResult::Progress)
            }
            Decision::Wait => Ok(StepResult::Idle),
            Decision::Finish { reflection } => self.finish(ctx, reflection),
        }
    }
}
