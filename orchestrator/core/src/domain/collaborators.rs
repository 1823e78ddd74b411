// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # External Collaborators
//!
//! Interfaces the runtime calls out to but does not own:
//!
//! | Trait | Contract |
//! |-------|----------|
//! | [`StatusReporter`] | best-effort job status push; transport errors are swallowed |
//! | [`AlertSink`] | raise an alert, returns its id when one was created |
//! | [`ResponseWaiter`] | block until a human answers an alert, `None` on timeout |
//!
//! Implementations live in `crate::infrastructure` (`HttpStatusReporter`,
//! `AlertDesk`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report_status(&self, job_id: &str, status: &str, extra: Option<serde_json::Value>);
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn trigger_alert(
        &self,
        job_id: &str,
        message: &str,
        choices: &[String],
        severity: Severity,
    ) -> Option<AlertId>;
}

#[async_trait]
pub trait ResponseWaiter: Send + Sync {
    async fn wait_for_response(&self, alert_id: &AlertId, timeout: Duration) -> Option<String>;

    /// Nobody will wait on this alert. It stays open until answered.
    async fn release(&self, _alert_id: &AlertId) {}
}

/// Reporter/alerter used when nothing external is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

#[async_trait]
impl StatusReporter for Detached {
    async fn report_status(&self, _job_id: &str, _status: &str, _extra: Option<serde_json::Value>) {}
}

#[async_trait]
impl AlertSink for Detached {
    async fn trigger_alert(
        &self,
        _job_id: &str,
        _message: &str,
        _choices: &[String],
        _severity: Severity,
    ) -> Option<AlertId> {
        None
    }
}

#[async_trait]
impl ResponseWaiter for Detached {
    async fn wait_for_response(&self, _alert_id: &AlertId, _timeout: Duration) -> Option<String> {
        None
    }
}

/// The collaborator set handed to every agent step.
#[derive(Clone)]
pub struct Collaborators {
    pub status: Arc<dyn StatusReporter>,
    pub alerts: Arc<dyn AlertSink>,
    pub responses: Arc<dyn ResponseWaiter>,
}

impl Collaborators {
    pub fn detached() -> Self {
        Self {
            status: Arc::new(Detached),
            alerts: Arc::new(Detached),
            responses: Arc::new(Detached),
        }
    }

    pub fn with_status(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn with_alerts<A>(mut self, desk: Arc<A>) -> Self
    where
        A: AlertSink + ResponseWaiter + 'static,
    {
        self.alerts = desk.clone();
        self.responses = desk;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::detached()
    }
}
