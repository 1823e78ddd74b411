// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Child Handle
//!
//! Supervisor-side proxy for one spawned agent. The runtime never touches a
//! worker's internals; it only goes through this handle:
//!
//! | Operation | Channel |
//! |-----------|---------|
//! | `send_command` | unbounded mpsc, supervisor → worker |
//! | `poll_events` | unbounded mpsc, worker → supervisor |
//! | `steer` | shared [`SteerBuffer`], lock-protected, never blocks |
//! | `status` | `watch` channel written only by the worker |
//! | `terminate` | STOP, bounded wait, then task abort |

use crate::application::steer_buffer::{SteerAdmission, SteerBuffer};
use crate::domain::agent::{AgentId, AgentInfo, AgentStatus};
use crate::domain::entry::Steer;
use crate::domain::ipc::{Command, Event};
use crate::domain::runtime::RuntimeError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Worker-side end of the event channel. Every send also wakes the
/// supervisor loop.
#[derive(Clone)]
pub struct EventSink {
    agent_id: AgentId,
    sender: mpsc::UnboundedSender<Event>,
    supervisor: Arc<Notify>,
}

impl EventSink {
    pub fn channel(agent_id: AgentId, supervisor: Arc<Notify>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                agent_id,
                sender,
                supervisor,
            },
            receiver,
        )
    }

    pub fn send(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!(agent_id = %self.agent_id, "Supervisor side of event channel is gone");
        }
        self.supervisor.notify_one();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Already DONE, FAILED or STOPPED; nothing was sent
    AlreadyTerminal,
    /// The worker reached this terminal status within the grace period
    Graceful(AgentStatus),
    /// Grace period elapsed (or the worker vanished); the task was aborted
    Forced,
}

pub struct ChildHandle {
    info: AgentInfo,
    commands: mpsc::UnboundedSender<Command>,
    events: Mutex<mpsc::UnboundedReceiver<Event>>,
    status: watch::Receiver<AgentStatus>,
    steers: Arc<SteerBuffer>,
    task: Mutex<Option<JoinHandle<()>>>,
    forced: AtomicBool,
    terminal_since: Mutex<Option<Instant>>,
}

impl ChildHandle {
    pub(crate) fn new(
        info: AgentInfo,
        commands: mpsc::UnboundedSender<Command>,
        events: mpsc::UnboundedReceiver<Event>,
        status: watch::Receiver<AgentStatus>,
        steers: Arc<SteerBuffer>,
    ) -> Self {
        Self {
            info,
            commands,
            events: Mutex::new(events),
            status,
            steers,
            task: Mutex::new(None),
            forced: AtomicBool::new(false),
            terminal_since: Mutex::new(None),
        }
    }

    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    pub fn agent_id(&self) -> AgentId {
        self.info.id
    }

    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    pub fn status(&self) -> AgentStatus {
        if self.forced.load(Ordering::Acquire) {
            return AgentStatus::Stopped;
        }
        *self.status.borrow()
    }

    /// Status stream as published by the worker (ignores forced stops).
    pub fn status_receiver(&self) -> watch::Receiver<AgentStatus> {
        self.status.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Non-blocking enqueue to the worker.
    pub fn send_command(&self, command: Command) -> Result<(), RuntimeError> {
        if self.is_terminal() {
            return Err(RuntimeError::ChannelClosed(self.agent_id()));
        }
        self.commands
            .send(command)
            .map_err(|_| RuntimeError::ChannelClosed(self.agent_id()))
    }

    /// Events emitted since the last poll, in emission order.
    pub fn poll_events(&self) -> Vec<Event> {
        let mut receiver = self.events.lock();
        let mut drained = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Place a steer straight into the worker's steer buffer. The buffer is
    /// closed under its own lock at the terminal transition, so a steer
    /// racing the agent's end is refused rather than stranded.
    pub fn steer(&self, steer: Steer) -> Result<SteerAdmission, RuntimeError> {
        if self.is_terminal() {
            return Err(RuntimeError::AgentTerminated(self.agent_id()));
        }
        match self.steers.push(steer) {
            SteerAdmission::Closed(_) => Err(RuntimeError::AgentTerminated(self.agent_id())),
            admission => Ok(admission),
        }
    }

    /// Steers accepted but never handled by the worker. Closes the buffer,
    /// so each one is returned at most once.
    pub fn undelivered_steers(&self) -> Vec<Steer> {
        self.steers.close();
        self.steers.drain()
    }

    /// Two-phase shutdown: STOP, wait up to `grace` for a terminal status,
    /// then abort the worker task.
    pub async fn terminate(&self, grace: Duration) -> TerminateOutcome {
        if self.is_terminal() {
            return TerminateOutcome::AlreadyTerminal;
        }

        if self.commands.send(Command::stop()).is_err() {
            debug!(agent_id = %self.agent_id(), "Command channel closed before STOP");
        }

        let mut status = self.status.clone();
        let waited = tokio::time::timeout(grace, status.wait_for(|s| s.is_terminal()))
            .await
            .map(|result| result.map(|s| *s));

        match waited {
            Ok(Ok(terminal)) => TerminateOutcome::Graceful(terminal),
            Ok(Err(_)) | Err(_) => {
                if let Some(task) = self.task.lock().take() {
                    task.abort();
                }
                self.forced.store(true, Ordering::Release);
                warn!(
                    agent_id = %self.agent_id(),
                    grace_ms = grace.as_millis() as u64,
                    "Agent did not stop within grace period; task aborted"
                );
                TerminateOutcome::Forced
            }
        }
    }

    /// First instant this handle was observed terminal, recorded on the
    /// first call that sees a terminal status.
    pub fn terminal_since(&self) -> Option<Instant> {
        if !self.is_terminal() {
            return None;
        }
        Some(*self.terminal_since.lock().get_or_insert_with(Instant::now))
    }

    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_none_or(|task| task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentSpec;
    use crate::domain::ipc::CommandType;

    struct Harness {
        handle: ChildHandle,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<AgentStatus>,
        sink: EventSink,
    }

    fn harness() -> Harness {
        let id = AgentId::new();
        let info = AgentInfo::from_spec(id, &AgentSpec::new("test"));
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (sink, events) = EventSink::channel(id, Arc::new(Notify::new()));
        let (status, status_rx) = watch::channel(AgentStatus::Running);
        let steers = Arc::new(SteerBuffer::new(4, Arc::new(Notify::new())));
        Harness {
            handle: ChildHandle::new(info, command_tx, events, status_rx, steers),
            commands,
            status,
            sink,
        }
    }

    #[test]
    fn test_poll_events_preserves_order() {
        let h = harness();
        let id = h.handle.agent_id();
        h.sink.send(Event::started(id));
        h.sink.send(Event::iteration(id, 1));
        h.sink.send(Event::iteration(id, 2));

        let polled: Vec<_> = h
            .handle
            .poll_events()
            .iter()
            .map(|e| e.iteration_number())
            .collect();
        assert_eq!(polled, vec![None, Some(1), Some(2)]);
        assert!(h.handle.poll_events().is_empty());
    }

    #[test]
    fn test_send_command_after_terminal_is_channel_closed() {
        let mut h = harness();
        h.handle.send_command(Command::pause()).unwrap();
        assert_eq!(h.commands.try_recv().unwrap().command_type, CommandType::Pause);

        h.status.send(AgentStatus::Done).unwrap();
        assert!(matches!(
            h.handle.send_command(Command::resume()),
            Err(RuntimeError::ChannelClosed(_))
        ));
        assert!(matches!(
            h.handle.steer(Steer::high("late", "ui")),
            Err(RuntimeError::AgentTerminated(_))
        ));
    }

    #[test]
    fn test_steer_into_closed_buffer_is_agent_terminated() {
        let h = harness();
        h.handle.steer(Steer::high("queued", "ui")).unwrap();

        // Worker reached its end but the status has not been published yet
        let leftover = h.handle.undelivered_steers();
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover[0].content, "queued");
        assert!(matches!(
            h.handle.steer(Steer::high("racing", "ui")),
            Err(RuntimeError::AgentTerminated(_))
        ));
        assert!(h.handle.undelivered_steers().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let Harness {
            handle,
            mut commands,
            status,
            sink: _sink,
        } = harness();
        tokio::spawn(async move {
            if let Some(command) = commands.recv().await {
                assert_eq!(command.command_type, CommandType::Stop);
                let _ = status.send(AgentStatus::Stopped);
            }
            // keep sender alive until the handle observed the value
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let outcome = handle.terminate(Duration::from_secs(2)).await;
        assert_eq!(outcome, TerminateOutcome::Graceful(AgentStatus::Stopped));
        assert_eq!(
            handle.terminate(Duration::from_secs(2)).await,
            TerminateOutcome::AlreadyTerminal
        );
    }

    #[tokio::test]
    async fn test_terminate_forces_unresponsive_worker() {
        let h = harness();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        h.handle.attach(stuck);

        let outcome = h.handle.terminate(Duration::from_millis(50)).await;
        assert_eq!(outcome, TerminateOutcome::Forced);
        assert_eq!(h.handle.status(), AgentStatus::Stopped);
        assert!(h.handle.terminal_since().is_some());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.handle.is_finished());
        drop(h.status);
    }
}
