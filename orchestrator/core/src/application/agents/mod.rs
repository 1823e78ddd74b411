// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Built-in agent variants.
//!
//! | Kind | Type | Role |
//! |------|------|------|
//! | `orchestrator` | [`OrchestratorAgent`] | spawns children, directs them, aggregates their results |
//! | `executor` | [`ExecutorAgent`] | runs one subprocess and reports its outcome |
//! | `sidecar` | [`SidecarAgent`] | tails a log, raises alerts on matching lines |
//! | `research` | [`ResearchAgent`] | model-driven decision loop |

pub mod executor;
pub mod orchestrator;
pub mod research;
pub mod sidecar;

pub use executor::ExecutorAgent;
pub use orchestrator::OrchestratorAgent;
pub use research::ResearchAgent;
pub use sidecar::SidecarAgent;

use crate::domain::agent::AgentSpec;
use crate::domain::runtime::RuntimeError;
use serde::de::DeserializeOwned;

/// Decode a variant's params. Absent params decode as `{}`.
pub(crate) fn parse_params<T: DeserializeOwned>(spec: &AgentSpec) -> Result<T, RuntimeError> {
    let params = if spec.params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        spec.params.clone()
    };
    serde_json::from_value(params)
        .map_err(|e| RuntimeError::SpawnValidation(format!("invalid {} params: {}", spec.kind, e)))
}
