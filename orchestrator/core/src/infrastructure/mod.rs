// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod alert_desk;
pub mod event_relay;
pub mod llm;
pub mod status_reporter;
pub mod store;

pub use alert_desk::{AlertDesk, PendingAlertInfo};
pub use event_relay::{ChannelListener, EventListener, EventRelay, ListenerId};
pub use status_reporter::HttpStatusReporter;
