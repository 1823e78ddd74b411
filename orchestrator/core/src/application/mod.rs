// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod agents;
pub mod child_handle;
pub mod journal;
pub mod mailbox;
pub mod memory;
pub mod registry;
pub mod runtime;
pub mod steer_buffer;
pub mod worker;

pub use agent::{AgentBehavior, StepContext, StepResult};
pub use memory::{EntryFilter, MemoryHub, MemoryView};
pub use registry::AgentRegistry;
pub use steer_buffer::{SteerAdmission, SteerBuffer};
