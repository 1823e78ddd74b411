// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Decision Model Domain Interface (Anti-Corruption Layer)
//
// The research agent's loop asks a model what to do next. The model sees a
// bounded slice of the agent's memory plus any steers received this step,
// and answers with one Decision. Vendor adapters live in
// infrastructure/llm/.

use crate::domain::agent::{AgentId, AgentSpec};
use crate::domain::entry::{Entry, Scope, Steer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait DecisionModel: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, ModelError>;

    /// Short name for logs ("scripted", "openai-compatible:gpt-4o")
    fn name(&self) -> String;
}

/// Everything the model is shown for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub agent_id: AgentId,
    pub goal: String,
    pub iteration: u64,
    /// Recent visible entries, oldest first
    pub history: Vec<Entry>,
    /// Steers received since the previous decision, most urgent first
    pub steers: Vec<Steer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Message {
        content: String,
        #[serde(default = "default_scope")]
        scope: Scope,
    },
    Spawn {
        spec: AgentSpec,
    },
    Wait,
    Finish {
        reflection: String,
    },
}

fn default_scope() -> Scope {
    Scope::Subtree
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Model returned an unusable decision: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        let decision: Decision =
            serde_json::from_str(r#"{"action":"message","content":"try lr=3e-4"}"#).unwrap();
        assert_eq!(
            decision,
            Decision::Message {
                content: "try lr=3e-4".into(),
                scope: Scope::Subtree
            }
        );

        let spawn: Decision = serde_json::from_str(
            r#"{"action":"spawn","spec":{"kind":"executor","params":{"command":"true"}}}"#,
        )
        .unwrap();
        assert!(matches!(spawn, Decision::Spawn { spec } if spec.kind == "executor"));

        let wait: Decision = serde_json::from_str(r#"{"action":"wait"}"#).unwrap();
        assert_eq!(wait, Decision::Wait);
    }
}
