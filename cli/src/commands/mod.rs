// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Research Hub CLI

pub mod config;
pub mod history;
pub mod respond;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::history::HistoryArgs;
pub use self::respond::RespondArgs;
pub use self::run::RunArgs;
