// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Alert Desk - human-in-the-loop alerts raised by agents
//!
//! Keeps the set of open alerts, announces them on the event relay, and
//! resolves waiters from either of two answer paths:
//!
//! - in-process: [`AlertDesk::respond`] (UI, tests)
//! - out-of-process: a `<alert_id>.response` file dropped into the
//!   configured response directory (`research-hub respond`)
//!
//! When a response directory is configured each alert is also written there
//! as `<alert_id>.alert.json` so external tooling can see what is pending.
//!
//! An alert leaves the desk when its waiter returns, or, for a released
//! alert nobody waits on, when it is answered.

use crate::domain::collaborators::{AlertId, AlertSink, ResponseWaiter, Severity};
use crate::domain::events::HubEvent;
use crate::domain::node_config::AlertsConfig;
use crate::infrastructure::event_relay::EventRelay;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

/// Alert summary for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAlertInfo {
    pub alert_id: AlertId,
    pub job_id: String,
    pub message: String,
    pub choices: Vec<String>,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

struct PendingAlert {
    info: PendingAlertInfo,
    /// Taken by the first answer
    responder: Option<oneshot::Sender<String>>,
    /// Taken by the (single) waiter
    receiver: Option<oneshot::Receiver<String>>,
    released: bool,
}

pub struct AlertDesk {
    pending: Arc<RwLock<HashMap<AlertId, PendingAlert>>>,
    relay: EventRelay,
    response_dir: Option<PathBuf>,
    poll_interval: Duration,
}

impl AlertDesk {
    pub fn new(relay: EventRelay) -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            relay,
            response_dir: None,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(relay: EventRelay, config: &AlertsConfig) -> Self {
        let mut desk = Self::new(relay);
        desk.response_dir = config.response_dir.clone();
        desk.poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        desk
    }

    pub fn with_response_dir(mut self, dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        self.response_dir = Some(dir.into());
        self.poll_interval = poll_interval;
        self
    }

    pub fn response_path(dir: &Path, alert_id: &AlertId) -> PathBuf {
        dir.join(format!("{}.response", alert_id))
    }

    pub fn alert_path(dir: &Path, alert_id: &AlertId) -> PathBuf {
        dir.join(format!("{}.alert.json", alert_id))
    }

    /// Answer an open alert. Returns false when the alert is unknown or was
    /// already answered.
    pub async fn respond(&self, alert_id: &AlertId, choice: impl Into<String>) -> bool {
        let choice = choice.into();
        let (responder, settled) = {
            let mut pending = self.pending.write().await;
            let (responder, released) = match pending.get_mut(alert_id) {
                Some(alert) => (alert.responder.take(), alert.released),
                None => (None, false),
            };
            // Nobody will ever collect the answer of a released alert
            let settled = released && responder.is_some();
            if settled {
                pending.remove(alert_id);
            }
            (responder, settled)
        };
        if settled {
            self.remove_alert_file(alert_id).await;
        }

        match responder {
            Some(tx) => {
                // The waiter may have timed out in between; the answer still counts
                let _ = tx.send(choice.clone());
                info!(alert_id = %alert_id, choice = %choice, "Alert answered");
                self.relay.emit(HubEvent::AlertResolved {
                    alert_id: alert_id.clone(),
                    response: choice,
                });
                true
            }
            None => false,
        }
    }

    /// Open alerts, oldest first.
    pub async fn pending(&self) -> Vec<PendingAlertInfo> {
        let pending = self.pending.read().await;
        let mut open: Vec<_> = pending
            .values()
            .filter(|alert| alert.responder.is_some())
            .map(|alert| alert.info.clone())
            .collect();
        open.sort_by_key(|info| info.raised_at);
        open
    }

    async fn poll_response_file(path: Option<PathBuf>, interval: Duration) -> String {
        loop {
            if let Some(path) = &path {
                if let Ok(content) = tokio::fs::read_to_string(path).await {
                    let answer = content.trim();
                    if !answer.is_empty() {
                        return answer.to_string();
                    }
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn remove_alert_file(&self, alert_id: &AlertId) {
        if let Some(dir) = &self.response_dir {
            let _ = tokio::fs::remove_file(Self::alert_path(dir, alert_id)).await;
        }
    }

    async fn write_alert_file(&self, info: &PendingAlertInfo) {
        let Some(dir) = &self.response_dir else {
            return;
        };
        let body = match serde_json::to_vec_pretty(info) {
            Ok(body) => body,
            Err(e) => {
                warn!(alert_id = %info.alert_id, error = %e, "Failed to serialize alert");
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = ?dir, error = %e, "Failed to create alert directory");
            return;
        }
        if let Err(e) = tokio::fs::write(Self::alert_path(dir, &info.alert_id), body).await {
            warn!(alert_id = %info.alert_id, error = %e, "Failed to write alert file");
        }
    }
}

#[async_trait]
impl AlertSink for AlertDesk {
    async fn trigger_alert(
        &self,
        job_id: &str,
        message: &str,
        choices: &[String],
        severity: Severity,
    ) -> Option<AlertId> {
        let alert_id = AlertId::new();
        let info = PendingAlertInfo {
            alert_id: alert_id.clone(),
            job_id: job_id.to_string(),
            message: message.to_string(),
            choices: choices.to_vec(),
            severity,
            raised_at: Utc::now(),
        };
        let (tx, rx) = oneshot::channel();

        self.write_alert_file(&info).await;
        self.pending.write().await.insert(
            alert_id.clone(),
            PendingAlert {
                info: info.clone(),
                responder: Some(tx),
                receiver: Some(rx),
                released: false,
            },
        );

        metrics::counter!("research_hub_alerts_total", "severity" => format!("{:?}", severity).to_lowercase())
            .increment(1);
        info!(alert_id = %alert_id, job_id, severity = ?severity, "Alert raised: {}", message);
        self.relay.emit(HubEvent::AlertRaised {
            alert_id: alert_id.clone(),
            job_id: info.job_id,
            message: info.message,
            choices: info.choices,
            severity,
        });
        Some(alert_id)
    }
}

#[async_trait]
impl ResponseWaiter for AlertDesk {
    async fn wait_for_response(&self, alert_id: &AlertId, timeout: Duration) -> Option<String> {
        let receiver = {
            let mut pending = self.pending.write().await;
            pending.get_mut(alert_id).and_then(|alert| alert.receiver.take())
        };
        let Some(receiver) = receiver else {
            debug!(alert_id = %alert_id, "No waitable alert with this id");
            return None;
        };

        let path = self
            .response_dir
            .as_deref()
            .map(|dir| Self::response_path(dir, alert_id));
        let poll = Self::poll_response_file(path.clone(), self.poll_interval);

        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                answer = receiver => answer.ok().map(|a| (a, false)),
                answer = poll => Some((answer, true)),
            }
        })
        .await;

        self.pending.write().await.remove(alert_id);
        self.remove_alert_file(alert_id).await;

        match outcome {
            Ok(Some((answer, from_file))) => {
                if from_file {
                    if let Some(path) = &path {
                        let _ = tokio::fs::remove_file(path).await;
                    }
                    info!(alert_id = %alert_id, choice = %answer, "Alert answered via response file");
                    self.relay.emit(HubEvent::AlertResolved {
                        alert_id: alert_id.clone(),
                        response: answer.clone(),
                    });
                }
                Some(answer)
            }
            Ok(None) => None,
            Err(_) => {
                warn!(alert_id = %alert_id, timeout_ms = timeout.as_millis() as u64, "Alert response timed out");
                None
            }
        }
    }

    async fn release(&self, alert_id: &AlertId) {
        let answered = {
            let mut pending = self.pending.write().await;
            let Some(alert) = pending.get_mut(alert_id) else {
                return;
            };
            alert.released = true;
            alert.receiver = None;
            let answered = alert.responder.is_none();
            if answered {
                pending.remove(alert_id);
            }
            answered
        };
        if answered {
            self.remove_alert_file(alert_id).await;
        }
        debug!(alert_id = %alert_id, "Alert released; nobody will wait on it");
    }
}
