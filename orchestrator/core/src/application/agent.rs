// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Behaviour Contract
//!
//! Every agent variant implements [`AgentBehavior`]. The worker owns the
//! behaviour and drives it one step at a time:
//!
//! 1. pending steers, most urgent first (`on_steer`);
//! 2. queued mailbox entries in arrival order (`on_message`), re-checking
//!    the steer buffer before each one;
//! 3. one `step`.
//!
//! Errors returned from any hook, and panics raised inside one, fail the
//! agent. [`StepContext`] is the agent's only way to touch the outside world.

use crate::application::child_handle::EventSink;
use crate::application::journal::AgentJournal;
use crate::application::memory::MemoryView;
use crate::domain::agent::{AgentId, AgentInfo, AgentSpec};
use crate::domain::collaborators::Collaborators;
use crate::domain::entry::{Entry, EntryType, Scope, Steer};
use crate::domain::ipc::{Event, SpawnResponse};
use crate::domain::runtime::AgentError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Did useful work; step again right away
    Progress,
    /// Nothing to do until a message, steer or command arrives
    Idle,
    /// Finished successfully
    Done { reflection: String },
}

#[async_trait]
pub trait AgentBehavior: Send {
    /// Runs once, after RUNNING and before the first step.
    async fn on_start(&mut self, _ctx: &StepContext) -> Result<(), AgentError> {
        Ok(())
    }

    /// Default records the steer as a STATUS entry visible to the agent.
    async fn on_steer(&mut self, ctx: &StepContext, steer: Steer) -> Result<(), AgentError> {
        ctx.record(
            EntryType::Status,
            Scope::SelfOnly,
            serde_json::json!({
                "steer": steer.content,
                "urgency": steer.urgency,
                "source": steer.source,
            }),
        )?;
        Ok(())
    }

    async fn on_message(&mut self, _ctx: &StepContext, _entry: Entry) -> Result<(), AgentError> {
        Ok(())
    }

    async fn on_spawn_response(
        &mut self,
        _ctx: &StepContext,
        _response: SpawnResponse,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn step(&mut self, ctx: &StepContext) -> Result<StepResult, AgentError>;

    /// Cleanup when a STOP is honored. Not called on DONE or FAILED.
    async fn on_stop(&mut self, _ctx: &StepContext) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Capabilities handed to an agent's hooks.
#[derive(Clone)]
pub struct StepContext {
    info: Arc<AgentInfo>,
    iteration: Arc<AtomicU64>,
    journal: AgentJournal,
    view: MemoryView,
    events: EventSink,
    collaborators: Collaborators,
}

impl StepContext {
    pub(crate) fn new(
        info: AgentInfo,
        journal: AgentJournal,
        view: MemoryView,
        events: EventSink,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            info: Arc::new(info),
            iteration: Arc::new(AtomicU64::new(0)),
            journal,
            view,
            events,
            collaborators,
        }
    }

    pub fn agent_id(&self) -> AgentId {
        self.info.id
    }

    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    pub fn parent(&self) -> Option<AgentId> {
        self.info.parent
    }

    /// Completed steps so far.
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Acquire)
    }

    pub(crate) fn advance_iteration(&self) -> u64 {
        self.iteration.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn view(&self) -> &MemoryView {
        &self.view
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub(crate) fn journal(&self) -> &AgentJournal {
        &self.journal
    }

    /// Low-priority MESSAGE visible per `scope`.
    pub fn send_message(&self, content: impl Into<String>, scope: Scope) -> Result<Entry, AgentError> {
        Ok(self
            .journal
            .append(Entry::message(self.agent_id(), scope, content))?)
    }

    pub fn send_to(
        &self,
        recipient: AgentId,
        entry_type: EntryType,
        payload: serde_json::Value,
    ) -> Result<Entry, AgentError> {
        Ok(self.journal.send_to(recipient, entry_type, payload)?)
    }

    pub fn record(
        &self,
        entry_type: EntryType,
        scope: Scope,
        payload: serde_json::Value,
    ) -> Result<Entry, AgentError> {
        Ok(self.journal.record(entry_type, scope, payload)?)
    }

    /// Addressed to the parent when there is one, otherwise GLOBAL.
    pub fn report(&self, entry_type: EntryType, payload: serde_json::Value) -> Result<Entry, AgentError> {
        match self.parent() {
            Some(parent) => self.send_to(parent, entry_type, payload),
            None => self.record(entry_type, Scope::Global, payload),
        }
    }

    /// Ask the runtime to spawn a child of this agent. The answer arrives
    /// through `on_spawn_response` carrying the returned request id.
    pub fn request_spawn(&self, spec: AgentSpec) -> Uuid {
        let request_id = Uuid::new_v4();
        let spec = spec.with_parent(self.agent_id());
        self.events
            .send(Event::spawn_request(self.agent_id(), request_id, &spec));
        request_id
    }

    pub fn request_stop(&self, target: AgentId) {
        self.events.send(Event::stop_request(self.agent_id(), target));
    }

    /// Best-effort push to the status reporter for this agent's job, if any.
    pub async fn report_status(&self, status: &str, extra: Option<serde_json::Value>) {
        if let Some(job_id) = &self.info.job_id {
            self.collaborators
                .status
                .report_status(job_id, status, extra)
                .await;
        }
    }
}
