// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Research hub runtime.
//!
//! A supervisor for cooperating research agents: per-agent durable entry
//! logs, scoped memory views, priority steering, and an event relay for
//! external listeners.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Entry point:** [`application::runtime::Runtime`]

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::runtime::{Route, Runtime, RuntimeBuilder};
pub use infrastructure::event_relay::EventRelay;
