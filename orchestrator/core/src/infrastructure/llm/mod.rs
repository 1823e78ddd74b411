// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Decision Model Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain `DecisionModel` interface and
// an external API (or a fixed script).

pub mod catalog;
pub mod openai;
pub mod scripted;

pub use catalog::ModelCatalog;
pub use openai::OpenAIDecisionModel;
pub use scripted::ScriptedModel;
