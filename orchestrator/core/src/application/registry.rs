// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Registry - kind tag to constructor resolution
//
// Spawning goes through here before the runtime touches any state: an
// unknown kind or params the constructor rejects surface as
// `RuntimeError::SpawnValidation` and nothing is registered.

use crate::application::agent::AgentBehavior;
use crate::application::agents::{ExecutorAgent, OrchestratorAgent, ResearchAgent, SidecarAgent};
use crate::domain::agent::AgentSpec;
use crate::domain::runtime::RuntimeError;
use crate::infrastructure::llm::ModelCatalog;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type AgentConstructor =
    Arc<dyn Fn(&AgentSpec) -> Result<Box<dyn AgentBehavior>, RuntimeError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentRegistry {
    /// Empty registry; callers register their own kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in variants. Research agents resolve
    /// their `model` param against `catalog`.
    pub fn with_builtin(catalog: ModelCatalog) -> Self {
        let mut registry = Self::new();
        registry.register("orchestrator", |spec| {
            Ok(Box::new(OrchestratorAgent::from_spec(spec)?) as Box<dyn AgentBehavior>)
        });
        registry.register("executor", |spec| {
            Ok(Box::new(ExecutorAgent::from_spec(spec)?) as Box<dyn AgentBehavior>)
        });
        registry.register("sidecar", |spec| {
            Ok(Box::new(SidecarAgent::from_spec(spec)?) as Box<dyn AgentBehavior>)
        });
        registry.register("research", move |spec| {
            Ok(Box::new(ResearchAgent::from_spec(spec, &catalog)?) as Box<dyn AgentBehavior>)
        });
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&AgentSpec) -> Result<Box<dyn AgentBehavior>, RuntimeError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "Registering agent kind");
        self.constructors.insert(kind, Arc::new(constructor));
    }

    pub fn build(&self, spec: &AgentSpec) -> Result<Box<dyn AgentBehavior>, RuntimeError> {
        let constructor = self.constructors.get(&spec.kind).ok_or_else(|| {
            RuntimeError::SpawnValidation(format!(
                "unknown agent kind '{}' (known: {})",
                spec.kind,
                self.kinds().join(", ")
            ))
        })?;
        constructor(spec)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
