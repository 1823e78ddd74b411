// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Relay - Fan-out of hub events to external listeners
//
// Every emitted event is timestamped, appended to a bounded ring buffer for
// reconnect-and-replay, handed to each registered listener in registration
// order, and finally published on a broadcast channel for async consumers.
//
// Listeners run on the emitting task. A listener that needs to do slow work
// (network push, disk) must hand the event off, see `ChannelListener`.

use crate::domain::events::{unix_now, HubEvent, RelayEvent};
use crate::domain::node_config::RelayConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Synchronous sink for relay events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &RelayEvent) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&RelayEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &RelayEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct RelayInner {
    config: RelayConfig,
    buffer: Mutex<VecDeque<RelayEvent>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn EventListener>)>>,
    next_listener: AtomicU64,
    sender: broadcast::Sender<RelayEvent>,
}

#[derive(Clone)]
pub struct EventRelay {
    inner: Arc<RelayInner>,
}

impl EventRelay {
    pub fn new(config: RelayConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity.max(1));
        Self {
            inner: Arc::new(RelayInner {
                buffer: Mutex::new(VecDeque::with_capacity(config.capacity + 1)),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                sender,
                config,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(RelayConfig::default())
    }

    /// Stamp, buffer and fan out one event. Never fails: listener errors and
    /// panics are logged and counted, then the next listener runs.
    pub fn emit(&self, event: impl Into<RelayEvent>) {
        let mut event = event.into();
        if event.timestamp.is_none() {
            event.timestamp = Some(unix_now());
        }

        {
            let mut buffer = self.inner.buffer.lock();
            buffer.push_back(event.clone());
            if buffer.len() > self.inner.config.capacity {
                let excess = buffer.len() - self.inner.config.trim_to;
                buffer.drain(..excess);
                debug!(kept = buffer.len(), "Relay buffer trimmed");
            }
        }
        metrics::counter!("research_hub_relay_events_total").increment(1);

        // Snapshot so listeners may add/remove listeners without deadlocking
        let listeners: Vec<_> = self.inner.listeners.lock().clone();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    metrics::counter!("research_hub_relay_listener_failures_total").increment(1);
                    warn!(listener = id.0, error = %e, "Relay listener failed");
                }
                Err(_) => {
                    metrics::counter!("research_hub_relay_listener_failures_total").increment(1);
                    warn!(listener = id.0, "Relay listener panicked");
                }
            }
        }

        // No subscribers is not an error
        let _ = self.inner.sender.send(event);
    }

    /// Up to the last `n` buffered events with timestamp strictly greater
    /// than `since`, oldest first.
    pub fn recent(&self, n: usize, since: Option<f64>) -> Vec<RelayEvent> {
        let buffer = self.inner.buffer.lock();
        let matching: Vec<&RelayEvent> = buffer
            .iter()
            .filter(|event| match (since, event.timestamp) {
                (Some(since), Some(ts)) => ts > since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        let skip = matching.len().saturating_sub(n);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Every buffered event, oldest first.
    pub fn history(&self) -> Vec<RelayEvent> {
        self.inner.buffer.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, listener));
        id
    }

    /// Removing an unknown listener is a no-op.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn subscribe(&self) -> RelayReceiver {
        RelayReceiver {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Convenience for free-form notices (config reloads, operator actions).
    pub fn notice(&self, message: impl Into<String>, data: serde_json::Value) {
        self.emit(HubEvent::Notice {
            message: message.into(),
            data,
        });
    }
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Async receiver over the relay's broadcast stream
pub struct RelayReceiver {
    receiver: broadcast::Receiver<RelayEvent>,
}

impl RelayReceiver {
    pub async fn recv(&mut self) -> Result<RelayEvent, RelayError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RelayError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Relay receiver lagged by {} events", n);
                RelayError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<RelayEvent, RelayError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => RelayError::Empty,
            broadcast::error::TryRecvError::Closed => RelayError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Relay receiver lagged by {} events", n);
                RelayError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Event relay is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Listener that forwards events into a bounded channel so the consumer can
/// do slow work on its own task. A full channel drops the event and reports
/// a listener failure instead of blocking the emitter.
pub struct ChannelListener {
    sender: mpsc::Sender<RelayEvent>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RelayEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &RelayEvent) -> anyhow::Result<()> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow::anyhow!("listener channel full"),
            mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("listener channel closed"),
        })
    }
}
