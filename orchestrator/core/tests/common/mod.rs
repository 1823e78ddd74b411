// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use research_hub_core::application::agent::{AgentBehavior, StepContext, StepResult};
use research_hub_core::application::AgentRegistry;
use research_hub_core::domain::entry::{Entry, EntryType, Scope};
use research_hub_core::domain::runtime::AgentError;
use std::future::Future;
use std::time::Duration;

/// Records a STATUS entry for every message it handles; never finishes.
pub struct Recorder;

#[async_trait]
impl AgentBehavior for Recorder {
    async fn on_message(&mut self, ctx: &StepContext, entry: Entry) -> Result<(), AgentError> {
        ctx.record(
            EntryType::Status,
            Scope::SelfOnly,
            serde_json::json!({ "handled": entry.content().unwrap_or_default() }),
        )?;
        Ok(())
    }

    async fn step(&mut self, _ctx: &StepContext) -> Result<StepResult, AgentError> {
        Ok(StepResult::Idle)
    }
}

/// Fails on its first step.
pub struct Faulty;

#[async_trait]
impl AgentBehavior for Faulty {
    async fn step(&mut self, _ctx: &StepContext) -> Result<StepResult, AgentError> {
        Err(AgentError::Other("division by zero in reward model".into()))
    }
}

pub fn test_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register("recorder", |_spec| Ok(Box::new(Recorder) as Box<dyn AgentBehavior>));
    registry.register("faulty", |_spec| Ok(Box::new(Faulty) as Box<dyn AgentBehavior>));
    registry
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
