// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::llm::{Decision, DecisionModel, DecisionRequest, ModelError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Replays a fixed list of decisions, then finishes. Used for dry runs,
/// demos and tests.
pub struct ScriptedModel {
    decisions: Mutex<VecDeque<Decision>>,
}

impl ScriptedModel {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.decisions.lock().len()
    }
}

#[async_trait]
impl DecisionModel for ScriptedModel {
    async fn decide(&self, _request: &DecisionRequest) -> Result<Decision, ModelError> {
        Ok(self
            .decisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Decision::Finish {
                reflection: "script exhausted".to_string(),
            }))
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}
