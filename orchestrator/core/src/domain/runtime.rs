// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy for the runtime and for agent steps.
//!
//! `RuntimeError` is returned synchronously to callers of the runtime (bad
//! spec, unknown id, dead child). `AgentError` never reaches a caller: it is
//! caught at the step boundary and turned into a FAILED transition plus a
//! FAILED event.

use crate::domain::agent::{AgentId, TransitionError};
use crate::domain::llm::ModelError;
use crate::domain::repository::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Spawn validation failed: {0}")]
    SpawnValidation(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Agent {0} has already terminated")]
    AgentTerminated(AgentId),

    #[error("Command channel to agent {0} is closed")]
    ChannelClosed(AgentId),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    Invalid(String),

    #[error("{0}")]
    Other(String),
}
