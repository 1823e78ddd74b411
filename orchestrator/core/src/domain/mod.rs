// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model for the research hub runtime.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects, lifecycle rules, collaborator interfaces
//!   and error taxonomy. No I/O lives here.

pub mod agent;
pub mod collaborators;
pub mod entry;
pub mod events;
pub mod ipc;
pub mod llm;
pub mod node_config;
pub mod repository;
pub mod runtime;
