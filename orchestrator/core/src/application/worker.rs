// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Worker
//!
//! [`AgentUnit`] is the execution unit behind one [`ChildHandle`]: it owns
//! the agent's behaviour and lifecycle and runs as its own tokio task.
//!
//! ## Loop
//!
//! ```text
//! start ─► on_start ─► ┌──────────────────────────────────────────────┐
//!                      │ drain commands (STOP/PAUSE/RESUME/STEER/...) │
//!                      │ paused?  ─► wait for next command            │
//!                      │ step (steers ▸ mail ▸ behaviour.step)        │
//!                      │ Idle     ─► wait for wake / command / tick   │
//!                      └──────────────────────────────────────────────┘
//!                         Done ─► DONE    Err|panic ─► FAILED    STOP ─► STOPPED
//! ```
//!
//! The worker is the only writer of its status (`watch::Sender`).

use crate::application::agent::{AgentBehavior, StepContext, StepResult};
use crate::application::child_handle::{ChildHandle, EventSink};
use crate::application::journal::AgentJournal;
use crate::application::mailbox::Mailbox;
use crate::application::memory::{MemoryHub, SharedStore};
use crate::application::steer_buffer::SteerBuffer;
use crate::domain::agent::{AgentId, AgentInfo, AgentLifecycle, AgentStatus};
use crate::domain::collaborators::Collaborators;
use crate::domain::entry::EntryType;
use crate::domain::ipc::{Command, CommandType, Event};
use crate::domain::node_config::RuntimeConfig;
use crate::domain::repository::StoreError;
use crate::domain::runtime::AgentError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

const MAX_ERROR_SUMMARY: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub steer_capacity: usize,
    pub message_batch: usize,
    pub idle_tick: Duration,
}

impl From<&RuntimeConfig> for WorkerSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            steer_capacity: config.steer_buffer_capacity,
            message_batch: config.message_batch,
            idle_tick: config.idle_tick(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

enum Flow {
    Continue,
    Stop,
    Fail(String),
}

enum Exit {
    Done(String),
    Failed(String),
    Stopped,
}

pub struct AgentUnit {
    ctx: StepContext,
    behavior: Box<dyn AgentBehavior>,
    lifecycle: AgentLifecycle,
    status: watch::Sender<AgentStatus>,
    steers: Arc<SteerBuffer>,
    mailbox: Arc<Mailbox>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventSink,
    wake: Arc<Notify>,
    settings: WorkerSettings,
    handled_last_step: usize,
}

impl AgentUnit {
    /// Wire a new agent into the memory hub and build both ends of its
    /// control surface. The agent is left PENDING.
    pub(crate) fn assemble(
        info: AgentInfo,
        behavior: Box<dyn AgentBehavior>,
        store: SharedStore,
        hub: Arc<MemoryHub>,
        supervisor: Arc<Notify>,
        collaborators: Collaborators,
        settings: WorkerSettings,
    ) -> Result<(AgentUnit, ChildHandle), StoreError> {
        let agent_id = info.id;
        let wake = Arc::new(Notify::new());
        let steers = Arc::new(SteerBuffer::new(settings.steer_capacity, wake.clone()));
        let mailbox = Arc::new(Mailbox::new(wake.clone()));

        let view = hub.register_agent(agent_id, info.parent, store.clone(), mailbox.clone())?;
        let (events, events_rx) = EventSink::channel(agent_id, supervisor);
        let journal = AgentJournal::new(agent_id, store, hub, events.clone());
        let ctx = StepContext::new(info.clone(), journal, view, events.clone(), collaborators);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(AgentStatus::Pending);

        let handle = ChildHandle::new(info, command_tx, events_rx, status_rx, steers.clone());
        let unit = AgentUnit {
            ctx,
            behavior,
            lifecycle: AgentLifecycle::new(),
            status: status_tx,
            steers,
            mailbox,
            commands: command_rx,
            events,
            wake,
            settings,
            handled_last_step: 0,
        };
        Ok((unit, handle))
    }

    pub fn agent_id(&self) -> AgentId {
        self.ctx.agent_id()
    }

    pub fn status(&self) -> AgentStatus {
        self.lifecycle.status()
    }

    /// Write path the runtime uses to route messages on this agent's behalf.
    pub(crate) fn journal(&self) -> AgentJournal {
        self.ctx.journal().clone()
    }

    /// PENDING → RUNNING, before the task is spawned.
    pub fn start(&mut self) -> Result<(), AgentError> {
        self.lifecycle.transition(AgentStatus::Running)?;
        self.status.send_replace(AgentStatus::Running);
        self.events.send(Event::started(self.agent_id()));
        Ok(())
    }

    /// One scheduling point: every pending steer before each queued message
    /// (at most `message_batch` messages), then one behaviour step.
    pub async fn step(&mut self) -> Result<StepResult, AgentError> {
        let mut handled = 0;
        let mut messages = 0;
        loop {
            if let Some(steer) = self.steers.pop() {
                handled += 1;
                self.behavior.on_steer(&self.ctx, steer).await?;
                continue;
            }
            if messages >= self.settings.message_batch {
                break;
            }
            match self.mailbox.pop() {
                Some(entry) => {
                    handled += 1;
                    messages += 1;
                    self.behavior.on_message(&self.ctx, entry).await?;
                }
                None => break,
            }
        }
        self.handled_last_step = handled;
        self.behavior.step(&self.ctx).await
    }

    pub async fn run(mut self) {
        let agent_id = self.agent_id();
        info!(agent_id = %agent_id, kind = %self.ctx.info().kind, "Agent running");
        self.ctx.report_status("running", None).await;

        let exit = self.run_loop().await;
        // Refuse steers from here on; the runtime reports the leftovers
        self.steers.close();
        if !self.steers.is_empty() {
            debug!(agent_id = %agent_id, count = self.steers.len(), "Steers left unhandled at exit");
        }
        match exit {
            Exit::Done(reflection) => {
                self.finish(AgentStatus::Done);
                info!(agent_id = %agent_id, "Agent done");
                self.events.send(Event::done(agent_id, reflection.clone()));
                self.ctx
                    .report_status("done", Some(serde_json::json!({ "reflection": reflection })))
                    .await;
            }
            Exit::Failed(error) => {
                let summary = summarize(&error);
                warn!(agent_id = %agent_id, error = %summary, "Agent failed");
                if let Err(e) = self.ctx.report(
                    EntryType::Error,
                    serde_json::json!({ "error": summary, "iteration": self.ctx.iteration() }),
                ) {
                    warn!(agent_id = %agent_id, error = %e, "Could not record failure entry");
                }
                self.finish(AgentStatus::Failed);
                self.events.send(Event::failed(agent_id, summary.clone()));
                self.ctx
                    .report_status("failed", Some(serde_json::json!({ "error": summary })))
                    .await;
            }
            Exit::Stopped => {
                if let Err(e) = guard(self.behavior.on_stop(&self.ctx)).await {
                    warn!(agent_id = %agent_id, error = %e, "Agent cleanup on stop failed");
                }
                // A parent waiting on this child's RESULT must learn it never comes
                if let Some(parent) = self.ctx.parent() {
                    if let Err(e) = self.ctx.send_to(
                        parent,
                        EntryType::Error,
                        serde_json::json!({ "error": "stopped before completion", "stopped": true }),
                    ) {
                        warn!(agent_id = %agent_id, error = %e, "Could not notify parent of stop");
                    }
                }
                self.finish(AgentStatus::Stopped);
                info!(agent_id = %agent_id, "Agent stopped");
                self.events.send(Event::stopped(agent_id));
                self.ctx.report_status("stopped", None).await;
            }
        }
    }

    async fn run_loop(&mut self) -> Exit {
        if let Err(e) = guard(self.behavior.on_start(&self.ctx)).await {
            return Exit::Failed(e);
        }

        loop {
            match self.drain_commands().await {
                Flow::Continue => {}
                Flow::Stop => return Exit::Stopped,
                Flow::Fail(e) => return Exit::Failed(e),
            }

            if self.lifecycle.status() == AgentStatus::Paused {
                let flow = match self.commands.recv().await {
                    Some(command) => self.handle_command(command).await,
                    None => Flow::Stop,
                };
                match flow {
                    Flow::Continue => continue,
                    Flow::Stop => return Exit::Stopped,
                    Flow::Fail(e) => return Exit::Failed(e),
                }
            }

            let result = guard(self.step()).await;
            match result {
                Ok(StepResult::Done { reflection }) => {
                    self.complete_iteration();
                    return Exit::Done(reflection);
                }
                Ok(StepResult::Progress) => {
                    self.complete_iteration();
                    tokio::task::yield_now().await;
                }
                Ok(StepResult::Idle) => {
                    if self.handled_last_step > 0 {
                        self.complete_iteration();
                    }
                    let woke = tokio::select! {
                        _ = self.wake.notified() => None,
                        command = self.commands.recv() => Some(command),
                        _ = tokio::time::sleep(self.settings.idle_tick) => None,
                    };
                    let flow = match woke {
                        Some(Some(command)) => self.handle_command(command).await,
                        Some(None) => Flow::Stop,
                        None => Flow::Continue,
                    };
                    match flow {
                        Flow::Continue => {}
                        Flow::Stop => return Exit::Stopped,
                        Flow::Fail(e) => return Exit::Failed(e),
                    }
                }
                Err(e) => return Exit::Failed(e),
            }
        }
    }

    async fn drain_commands(&mut self) -> Flow {
        loop {
            match self.commands.try_recv() {
                Ok(command) => match self.handle_command(command).await {
                    Flow::Continue => {}
                    other => return other,
                },
                Err(mpsc::error::TryRecvError::Empty) => return Flow::Continue,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!(agent_id = %self.agent_id(), "Command channel closed; stopping");
                    return Flow::Stop;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        let agent_id = self.agent_id();
        match command.command_type {
            CommandType::Stop => Flow::Stop,
            CommandType::Pause => {
                if self.transition(AgentStatus::Paused) {
                    self.events.send(Event::paused(agent_id));
                }
                Flow::Continue
            }
            CommandType::Resume => {
                if self.transition(AgentStatus::Running) {
                    self.events.send(Event::resumed(agent_id));
                }
                Flow::Continue
            }
            CommandType::Steer => {
                match command.as_steer() {
                    Some(steer) => {
                        self.steers.push(steer);
                    }
                    None => warn!(agent_id = %agent_id, "Malformed STEER command ignored"),
                }
                Flow::Continue
            }
            CommandType::SpawnResponse => match command.as_spawn_response() {
                Some(response) => {
                    match guard(self.behavior.on_spawn_response(&self.ctx, response)).await {
                        Ok(()) => Flow::Continue,
                        Err(e) => Flow::Fail(e),
                    }
                }
                None => {
                    warn!(agent_id = %agent_id, "Malformed SPAWN_RESPONSE command ignored");
                    Flow::Continue
                }
            },
        }
    }

    fn complete_iteration(&mut self) {
        let iteration = self.ctx.advance_iteration();
        self.events.send(Event::iteration(self.agent_id(), iteration));
    }

    fn transition(&mut self, next: AgentStatus) -> bool {
        match self.lifecycle.transition(next) {
            Ok(()) => {
                self.status.send_replace(next);
                true
            }
            Err(e) => {
                debug!(agent_id = %self.agent_id(), error = %e, "Ignoring transition");
                false
            }
        }
    }

    fn finish(&mut self, terminal: AgentStatus) {
        if self.transition(terminal) {
            metrics::counter!("research_hub_agent_terminations_total", "status" => terminal.as_str())
                .increment(1);
        }
    }
}

/// Await an agent hook, turning both returned errors and panics into an
/// error summary.
async fn guard<T, F>(future: F) -> Result<T, String>
where
    F: Future<Output = Result<T, AgentError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("panic: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn summarize(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_SUMMARY {
        return error.to_string();
    }
    let truncated: String = error.chars().take(MAX_ERROR_SUMMARY).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentSpec;
    use crate::domain::entry::{Entry, Scope, Steer, SteerUrgency};
    use crate::domain::ipc::EventType;
    use crate::domain::repository::EntryStore;
    use crate::infrastructure::store::InMemoryEntryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every steer and message it sees, in order.
    struct Tracer {
        seen: Arc<Mutex<Vec<String>>>,
        finish_after: Option<u64>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl AgentBehavior for Tracer {
        async fn on_steer(&mut self, _ctx: &StepContext, steer: Steer) -> Result<(), AgentError> {
            self.seen.lock().push(format!("steer:{}", steer.content));
            Ok(())
        }

        async fn on_message(&mut self, _ctx: &StepContext, entry: Entry) -> Result<(), AgentError> {
            self.seen
                .lock()
                .push(format!("msg:{}", entry.content().unwrap_or_default()));
            Ok(())
        }

        async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError> {
            if let Some(message) = self.fail_with {
                panic!("{message}");
            }
            match self.finish_after {
                Some(n) if ctx.iteration() + 1 >= n => Ok(StepResult::Done {
                    reflection: "enough".into(),
                }),
                _ => Ok(StepResult::Idle),
            }
        }
    }

    fn build(behavior: Tracer, settings: WorkerSettings) -> (AgentUnit, ChildHandle, Arc<MemoryHub>) {
        let hub = Arc::new(MemoryHub::new(100));
        let id = AgentId::new();
        let info = AgentInfo::from_spec(id, &AgentSpec::new("tracer"));
        let boxed: Box<dyn EntryStore> = Box::new(InMemoryEntryStore::new());
        let store: SharedStore = Arc::new(Mutex::new(boxed));
        let (unit, handle) = AgentUnit::assemble(
            info,
            Box::new(behavior),
            store,
            hub.clone(),
            Arc::new(Notify::new()),
            Collaborators::detached(),
            settings,
        )
        .unwrap();
        (unit, handle, hub)
    }

    fn tracer(seen: &Arc<Mutex<Vec<String>>>) -> Tracer {
        Tracer {
            seen: seen.clone(),
            finish_after: None,
            fail_with: None,
        }
    }

    #[tokio::test]
    async fn test_steers_preempt_queued_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut unit, handle, _hub) = build(tracer(&seen), WorkerSettings::default());
        unit.start().unwrap();

        let sender = AgentId::new();
        for i in 1..=3 {
            unit.mailbox
                .deliver(Entry::message(sender, Scope::Global, format!("m{i}")));
        }
        handle
            .steer(Steer::new(SteerUrgency::Low, "low", "peer"))
            .unwrap();
        handle.steer(Steer::high("high", "ui")).unwrap();

        assert_eq!(unit.step().await.unwrap(), StepResult::Idle);
        assert_eq!(
            *seen.lock(),
            vec!["steer:high", "steer:low", "msg:m1", "msg:m2", "msg:m3"]
        );
    }

    #[tokio::test]
    async fn test_message_batch_limit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let settings = WorkerSettings {
            message_batch: 2,
            ..WorkerSettings::default()
        };
        let (mut unit, _handle, _hub) = build(tracer(&seen), settings);
        unit.start().unwrap();

        let sender = AgentId::new();
        for i in 1..=3 {
            unit.mailbox
                .deliver(Entry::message(sender, Scope::Global, format!("m{i}")));
        }
        unit.step().await.unwrap();
        assert_eq!(seen.lock().len(), 2);
        unit.step().await.unwrap();
        assert_eq!(seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_panic_in_step_fails_agent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let behavior = Tracer {
            fail_with: Some("kernel exploded"),
            ..tracer(&seen)
        };
        let (mut unit, handle, _hub) = build(behavior, WorkerSettings::default());
        unit.start().unwrap();
        unit.run().await;

        assert_eq!(handle.status(), AgentStatus::Failed);
        let events = handle.poll_events();
        let failed = events
            .iter()
            .find(|e| e.event_type == EventType::Failed)
            .unwrap();
        assert!(failed.error().unwrap().contains("kernel exploded"));
    }

    #[tokio::test]
    async fn test_pause_resume_and_stop_commands() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut unit, handle, _hub) = build(tracer(&seen), WorkerSettings::default());
        unit.start().unwrap();
        let task = tokio::spawn(unit.run());

        handle.send_command(Command::pause()).unwrap();
        let mut status = handle.status_receiver();
        status.wait_for(|s| *s == AgentStatus::Paused).await.unwrap();

        handle.send_command(Command::resume()).unwrap();
        status.wait_for(|s| *s == AgentStatus::Running).await.unwrap();

        let outcome = handle.terminate(Duration::from_secs(2)).await;
        assert_eq!(
            outcome,
            crate::application::child_handle::TerminateOutcome::Graceful(AgentStatus::Stopped)
        );
        task.await.unwrap();

        let types: Vec<_> = handle.poll_events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Started,
                EventType::Paused,
                EventType::Resumed,
                EventType::Stopped
            ]
        );
    }

    #[tokio::test]
    async fn test_done_after_iterations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let behavior = Tracer {
            finish_after: Some(1),
            ..tracer(&seen)
        };
        let (mut unit, handle, _hub) = build(behavior, WorkerSettings::default());
        unit.start().unwrap();
        unit.run().await;

        assert_eq!(handle.status(), AgentStatus::Done);
        let events = handle.poll_events();
        assert_eq!(events.last().unwrap().reflection(), Some("enough"));
        assert!(events.iter().any(|e| e.iteration_number() == Some(1)));
    }
}
