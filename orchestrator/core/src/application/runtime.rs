// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime (supervisor)
//!
//! Central authority for agent identity, spawning, routing and teardown.
//!
//! ## Registry
//!
//! One lock guards both the live handles and the tombstones of reaped
//! agents, so spawn, stop and steer are serialized against registry
//! mutation. There is at most one live handle per id and ids are never
//! reused. A tombstone keeps `steer` answering `AgentTerminated` (rather than
//! `UnknownAgent`) for as long as the runtime lives.
//!
//! ## Supervisor loop
//!
//! ```text
//! workers ──Event──► ChildHandle ──poll──► pump ──► EventRelay
//!                                           │
//!                                           ├─ SPAWN_REQUEST ─► spawn ─► SPAWN_RESPONSE
//!                                           ├─ STOP_REQUEST  ─► stop (own task)
//!                                           └─ reap terminated handles ─► tombstones
//! ```
//!
//! The loop wakes whenever a worker emits an event, and on a fixed tick.
//!
//! ## Shutdown
//!
//! `shutdown` flips the registry to closing under its write lock before it
//! collects the agents to stop. From then on every spawn is refused, both
//! from callers and from SPAWN_REQUESTs still in flight, so nothing can
//! start after the stop pass.

use crate::application::agent::AgentBehavior;
use crate::application::child_handle::{ChildHandle, TerminateOutcome};
use crate::application::journal::AgentJournal;
use crate::application::memory::{MemoryHub, MemoryView, SharedStore};
use crate::application::registry::AgentRegistry;
use crate::application::steer_buffer::SteerAdmission;
use crate::application::worker::{AgentUnit, WorkerSettings};
use crate::domain::agent::{AgentId, AgentInfo, AgentSnapshot, AgentSpec, AgentStatus};
use crate::domain::collaborators::Collaborators;
use crate::domain::entry::{Entry, EntryType, Scope, Steer, SteerUrgency};
use crate::domain::events::HubEvent;
use crate::domain::ipc::{Command, Event, EventType, SpawnResponse};
use crate::domain::node_config::{HubConfigSpec, RuntimeConfig};
use crate::domain::runtime::RuntimeError;
use crate::infrastructure::alert_desk::AlertDesk;
use crate::infrastructure::event_relay::EventRelay;
use crate::infrastructure::llm::ModelCatalog;
use crate::infrastructure::status_reporter::HttpStatusReporter;
use crate::infrastructure::store::StoreFactory;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where `route_message` sends a MESSAGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// DIRECT entry to one agent
    Agent(AgentId),
    /// SELF, SUBTREE or GLOBAL entry
    Scope(Scope),
}

struct LiveAgent {
    handle: Arc<ChildHandle>,
    journal: AgentJournal,
}

struct Tombstone {
    info: AgentInfo,
    status: AgentStatus,
    journal: AgentJournal,
}

#[derive(Default)]
struct Registry {
    live: HashMap<AgentId, LiveAgent>,
    tombstones: HashMap<AgentId, Tombstone>,
    closing: bool,
}

impl Registry {
    fn contains(&self, id: AgentId) -> bool {
        self.live.contains_key(&id) || self.tombstones.contains_key(&id)
    }
}

struct RuntimeInner {
    settings: RuntimeConfig,
    registry: AgentRegistry,
    agents: RwLock<Registry>,
    hub: Arc<MemoryHub>,
    relay: EventRelay,
    stores: StoreFactory,
    collaborators: Collaborators,
    supervisor: Arc<Notify>,
    shutdown: CancellationToken,
    supervisor_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Assembles a [`Runtime`]. Anything left unset falls back to: default
/// runtime settings, built-in agent kinds without models, a default-sized
/// relay, in-memory stores and detached collaborators.
#[derive(Default)]
pub struct RuntimeBuilder {
    settings: Option<RuntimeConfig>,
    registry: Option<AgentRegistry>,
    relay: Option<EventRelay>,
    stores: Option<StoreFactory>,
    collaborators: Option<Collaborators>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire every piece from a hub configuration: file or memory stores,
    /// model catalog, relay sizing, HTTP status reporter and alert desk.
    pub fn from_config(spec: &HubConfigSpec) -> anyhow::Result<Self> {
        let relay = EventRelay::new(spec.relay);
        let catalog = ModelCatalog::from_config(&spec.models)?;

        let mut collaborators = Collaborators::detached()
            .with_alerts(Arc::new(AlertDesk::from_config(relay.clone(), &spec.alerts)));
        if let Some(endpoint) = &spec.status.endpoint {
            info!("Reporting job status to {}", endpoint);
            collaborators = collaborators.with_status(Arc::new(HttpStatusReporter::new(
                endpoint.clone(),
                Duration::from_millis(spec.status.timeout_ms),
            )));
        }

        Ok(Self::new()
            .settings(spec.runtime.clone())
            .registry(AgentRegistry::with_builtin(catalog))
            .relay(relay)
            .stores(StoreFactory::from_config(&spec.storage))
            .collaborators(collaborators))
    }

    pub fn settings(mut self, settings: RuntimeConfig) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn relay(mut self, relay: EventRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn stores(mut self, stores: StoreFactory) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn build(self) -> Runtime {
        let settings = self.settings.unwrap_or_default();
        Runtime {
            inner: Arc::new(RuntimeInner {
                hub: Arc::new(MemoryHub::new(settings.memory_view_capacity)),
                settings,
                registry: self
                    .registry
                    .unwrap_or_else(|| AgentRegistry::with_builtin(ModelCatalog::new())),
                agents: RwLock::new(Registry::default()),
                relay: self.relay.unwrap_or_default(),
                stores: self.stores.unwrap_or(StoreFactory::Memory),
                collaborators: self.collaborators.unwrap_or_default(),
                supervisor: Arc::new(Notify::new()),
                shutdown: CancellationToken::new(),
                supervisor_task: Mutex::new(None),
            }),
        }
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn relay(&self) -> &EventRelay {
        &self.inner.relay
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    pub fn default_grace_period(&self) -> Duration {
        self.inner.settings.default_grace_period()
    }

    /// Validate `spec`, open the agent's store, wire its view and handle,
    /// and start it. Nothing is registered when validation fails.
    pub fn spawn(&self, spec: AgentSpec) -> Result<AgentId, RuntimeError> {
        let behavior: Box<dyn AgentBehavior> = self.inner.registry.build(&spec)?;

        let mut agents = self.inner.agents.write();
        if agents.closing {
            return Err(RuntimeError::SpawnValidation("runtime is shutting down".into()));
        }
        if let Some(parent) = spec.parent {
            if !agents.contains(parent) {
                return Err(RuntimeError::SpawnValidation(format!(
                    "parent agent {} does not exist",
                    parent
                )));
            }
        }

        let agent_id = AgentId::new();
        let info = AgentInfo::from_spec(agent_id, &spec);
        let store: SharedStore = Arc::new(Mutex::new(self.inner.stores.open(agent_id)?));
        let (mut unit, handle) = AgentUnit::assemble(
            info.clone(),
            behavior,
            store,
            self.inner.hub.clone(),
            self.inner.supervisor.clone(),
            self.inner.collaborators.clone(),
            WorkerSettings::from(&self.inner.settings),
        )?;
        let journal = unit.journal();
        if let Err(e) = unit.start() {
            self.inner.hub.forget(agent_id);
            return Err(RuntimeError::SpawnValidation(e.to_string()));
        }

        let handle = Arc::new(handle);
        handle.attach(tokio::spawn(unit.run()));
        agents.live.insert(agent_id, LiveAgent { handle, journal });
        let live = agents.live.len();
        drop(agents);

        metrics::counter!("research_hub_agents_spawned_total", "kind" => info.kind.clone()).increment(1);
        metrics::gauge!("research_hub_live_agents").set(live as f64);
        info!(
            agent_id = %agent_id,
            kind = %info.kind,
            name = %info.name,
            parent = ?info.parent,
            "Agent spawned"
        );
        self.inner.relay.emit(HubEvent::AgentSpawned {
            agent_id,
            kind: info.kind,
            name: info.name,
            parent: info.parent,
        });
        Ok(agent_id)
    }

    fn live_handle(&self, agent_id: AgentId) -> Result<Arc<ChildHandle>, RuntimeError> {
        let agents = self.inner.agents.read();
        if let Some(live) = agents.live.get(&agent_id) {
            return Ok(live.handle.clone());
        }
        if agents.tombstones.contains_key(&agent_id) {
            return Err(RuntimeError::AgentTerminated(agent_id));
        }
        Err(RuntimeError::UnknownAgent(agent_id))
    }

    /// Append a MESSAGE authored by `from`. It becomes visible to readers as
    /// soon as it is durable; mailbox delivery follows.
    pub fn route_message(
        &self,
        from: AgentId,
        route: Route,
        content: impl Into<String>,
    ) -> Result<Entry, RuntimeError> {
        let journal = {
            let agents = self.inner.agents.read();
            match agents.live.get(&from) {
                Some(live) if !live.handle.is_terminal() => live.journal.clone(),
                Some(_) => return Err(RuntimeError::AgentTerminated(from)),
                None if agents.tombstones.contains_key(&from) => {
                    return Err(RuntimeError::AgentTerminated(from))
                }
                None => return Err(RuntimeError::UnknownAgent(from)),
            }
        };

        let content = content.into();
        let entry = match route {
            Route::Agent(to) => {
                if !self.inner.agents.read().contains(to) {
                    return Err(RuntimeError::UnknownAgent(to));
                }
                journal.send_to(to, EntryType::Message, serde_json::json!({ "content": content }))?
            }
            Route::Scope(Scope::Direct) => {
                return Err(RuntimeError::InvalidRoute(
                    "DIRECT scope needs a recipient; route to an agent id instead".into(),
                ))
            }
            Route::Scope(scope) => journal.append(Entry::message(from, scope, content))?,
        };
        debug!(from = %from, route = ?route, entry_id = %entry.id, "Message routed");
        Ok(entry)
    }

    /// Place a steer in the agent's steer buffer, ahead of any queued
    /// message. Steers are not persisted.
    pub fn steer(&self, agent_id: AgentId, steer: Steer) -> Result<SteerAdmission, RuntimeError> {
        let handle = self.live_handle(agent_id)?;
        let urgency = steer.urgency;
        let source = steer.source.clone();
        let admission = handle.steer(steer)?;

        match &admission {
            SteerAdmission::Accepted => {
                self.steer_delivered(agent_id, urgency, source);
            }
            SteerAdmission::AcceptedEvicting(evicted) => {
                self.steer_delivered(agent_id, urgency, source);
                self.steer_dropped(agent_id, evicted, "evicted by a newer steer");
            }
            SteerAdmission::Rejected(rejected) => {
                self.steer_dropped(agent_id, rejected, "steer buffer full");
            }
            SteerAdmission::Closed(_) => return Err(RuntimeError::AgentTerminated(agent_id)),
        }
        Ok(admission)
    }

    fn steer_delivered(&self, agent_id: AgentId, urgency: SteerUrgency, source: String) {
        metrics::counter!("research_hub_steers_total", "outcome" => "delivered").increment(1);
        debug!(agent_id = %agent_id, urgency = %urgency, source = %source, "Steer delivered");
        self.inner.relay.emit(HubEvent::SteerDelivered {
            agent_id,
            urgency,
            source,
        });
    }

    fn steer_dropped(&self, agent_id: AgentId, steer: &Steer, reason: &str) {
        metrics::counter!("research_hub_steers_total", "outcome" => "dropped").increment(1);
        warn!(agent_id = %agent_id, urgency = %steer.urgency, reason, "Steer dropped");
        self.inner.relay.emit(HubEvent::SteerDropped {
            agent_id,
            urgency: steer.urgency,
            source: steer.source.clone(),
            reason: reason.to_string(),
        });
    }

    fn drop_undelivered_steers(&self, handle: &ChildHandle) {
        for steer in handle.undelivered_steers() {
            self.steer_dropped(handle.agent_id(), &steer, "agent terminated before handling it");
        }
    }

    /// Two-phase stop. Stopping an agent that already terminated is a no-op.
    pub async fn stop(&self, agent_id: AgentId, grace: Duration) -> Result<(), RuntimeError> {
        let (handle, journal) = {
            let agents = self.inner.agents.read();
            match agents.live.get(&agent_id) {
                Some(live) => (live.handle.clone(), live.journal.clone()),
                None if agents.tombstones.contains_key(&agent_id) => return Ok(()),
                None => return Err(RuntimeError::UnknownAgent(agent_id)),
            }
        };

        match handle.terminate(grace).await {
            TerminateOutcome::AlreadyTerminal => {
                debug!(agent_id = %agent_id, "Stop requested for terminated agent; nothing to do");
            }
            TerminateOutcome::Graceful(status) => {
                info!(agent_id = %agent_id, status = %status, "Agent stopped");
            }
            TerminateOutcome::Forced => {
                metrics::counter!("research_hub_agent_terminations_total", "status" => "forced").increment(1);
                self.drop_undelivered_steers(&handle);
                // The worker never got to announce its end
                if let Some(parent) = handle.info().parent {
                    if let Err(e) = journal.send_to(
                        parent,
                        EntryType::Error,
                        serde_json::json!({ "error": "stopped before completion (forced)", "stopped": true }),
                    ) {
                        warn!(agent_id = %agent_id, error = %e, "Could not notify parent of forced stop");
                    }
                }
                self.inner.relay.emit(HubEvent::AgentStatus {
                    agent_id,
                    status: AgentStatus::Stopped,
                    error: Some(format!("forced after {} ms grace period", grace.as_millis())),
                });
            }
        }
        self.inner.supervisor.notify_one();
        Ok(())
    }

    /// PAUSE, honored at the agent's next step boundary.
    pub fn pause(&self, agent_id: AgentId) -> Result<(), RuntimeError> {
        self.live_handle(agent_id)?.send_command(Command::pause())
    }

    pub fn resume(&self, agent_id: AgentId) -> Result<(), RuntimeError> {
        self.live_handle(agent_id)?.send_command(Command::resume())
    }

    /// Live memory view of an agent that has not been reaped.
    pub fn view(&self, agent_id: AgentId) -> Option<MemoryView> {
        self.inner.hub.view(agent_id)
    }

    /// Every entry the agent wrote, in append order. Falls back to replaying
    /// the persisted log for agents of earlier runs.
    pub fn history(&self, agent_id: AgentId) -> Result<Vec<Entry>, RuntimeError> {
        let journal = {
            let agents = self.inner.agents.read();
            agents
                .live
                .get(&agent_id)
                .map(|live| live.journal.clone())
                .or_else(|| agents.tombstones.get(&agent_id).map(|t| t.journal.clone()))
        };
        if let Some(journal) = journal {
            return Ok(journal.read_all()?);
        }
        self.inner
            .stores
            .replay(agent_id)?
            .ok_or(RuntimeError::UnknownAgent(agent_id))
    }

    /// Snapshot of every agent this runtime has spawned, oldest first.
    pub fn agents(&self) -> Vec<AgentSnapshot> {
        let agents = self.inner.agents.read();
        let mut snapshots: Vec<_> = agents
            .live
            .values()
            .map(|live| AgentSnapshot {
                info: live.handle.info().clone(),
                status: live.handle.status(),
            })
            .chain(agents.tombstones.values().map(|t| AgentSnapshot {
                info: t.info.clone(),
                status: t.status,
            }))
            .collect();
        snapshots.sort_by_key(|s| s.info.created_at);
        snapshots
    }

    pub fn status(&self, agent_id: AgentId) -> Option<AgentStatus> {
        let agents = self.inner.agents.read();
        agents
            .live
            .get(&agent_id)
            .map(|live| live.handle.status())
            .or_else(|| agents.tombstones.get(&agent_id).map(|t| t.status))
    }

    /// True once every spawned agent reached DONE, FAILED or STOPPED.
    pub fn all_terminal(&self) -> bool {
        self.inner
            .agents
            .read()
            .live
            .values()
            .all(|live| live.handle.is_terminal())
    }

    /// Drain worker events into the relay and act on agent requests, then
    /// reap handles terminated longer than the retention window. Returns the
    /// number of events handled.
    pub fn pump(&self) -> usize {
        let handles: Vec<Arc<ChildHandle>> = self
            .inner
            .agents
            .read()
            .live
            .values()
            .map(|live| live.handle.clone())
            .collect();

        let mut handled = 0;
        for handle in handles {
            for event in handle.poll_events() {
                handled += 1;
                self.dispatch(&handle, event);
            }
        }
        self.reap();
        handled
    }

    fn dispatch(&self, handle: &ChildHandle, event: Event) {
        let agent_id = event.agent_id;
        let relay = &self.inner.relay;
        let status = |status: AgentStatus, error: Option<String>| HubEvent::AgentStatus {
            agent_id,
            status,
            error,
        };

        match event.event_type {
            EventType::Started => relay.emit(status(AgentStatus::Running, None)),
            EventType::Paused => relay.emit(status(AgentStatus::Paused, None)),
            EventType::Resumed => relay.emit(status(AgentStatus::Running, None)),
            EventType::Stopped => {
                relay.emit(status(AgentStatus::Stopped, None));
                self.drop_undelivered_steers(handle);
            }
            EventType::Iteration => relay.emit(HubEvent::IterationComplete {
                agent_id,
                iteration: event.iteration_number().unwrap_or_default(),
            }),
            EventType::Done => {
                relay.emit(HubEvent::AgentDone {
                    agent_id,
                    reflection: event.reflection().unwrap_or_default().to_string(),
                });
                relay.emit(status(AgentStatus::Done, None));
                self.drop_undelivered_steers(handle);
            }
            EventType::Failed => {
                relay.emit(status(
                    AgentStatus::Failed,
                    Some(event.error().unwrap_or("unknown error").to_string()),
                ));
                self.drop_undelivered_steers(handle);
            }
            EventType::LogEntry => match event.entry() {
                Some(entry) => relay.emit(HubEvent::EntryAppended { agent_id, entry }),
                None => warn!(agent_id = %agent_id, "LOG_ENTRY event without an entry"),
            },
            EventType::SpawnRequest => match event.spawn_request_body() {
                Some((request_id, spec)) => {
                    let spec = spec.with_parent(agent_id);
                    // A request may outlive a requester that finished, but not
                    // one that was stopped
                    let spawned = if handle.status() == AgentStatus::Stopped {
                        Err(RuntimeError::AgentTerminated(agent_id))
                    } else {
                        self.spawn(spec)
                    };
                    let response = match spawned {
                        Ok(child) => SpawnResponse {
                            request_id,
                            agent_id: Some(child),
                            error: None,
                        },
                        Err(e) => {
                            warn!(agent_id = %agent_id, error = %e, "Spawn request rejected");
                            SpawnResponse {
                                request_id,
                                agent_id: None,
                                error: Some(e.to_string()),
                            }
                        }
                    };
                    if let Err(e) = handle.send_command(Command::spawn_response(&response)) {
                        debug!(agent_id = %agent_id, error = %e, "Requester gone before spawn response");
                    }
                }
                None => warn!(agent_id = %agent_id, "Malformed SPAWN_REQUEST ignored"),
            },
            EventType::StopRequest => match event.stop_target() {
                Some(target) => {
                    info!(agent_id = %agent_id, target = %target, "Agent requested a stop");
                    let runtime = self.clone();
                    let grace = self.default_grace_period();
                    tokio::spawn(async move {
                        if let Err(e) = runtime.stop(target, grace).await {
                            warn!(target = %target, error = %e, "Requested stop failed");
                        }
                    });
                }
                None => warn!(agent_id = %agent_id, "Malformed STOP_REQUEST ignored"),
            },
        }
    }

    fn reap(&self) {
        let retention = self.inner.settings.retention();
        let expired: Vec<(AgentId, Arc<ChildHandle>)> = self
            .inner
            .agents
            .read()
            .live
            .iter()
            .filter(|(_, live)| {
                live.handle.is_finished()
                    && live
                        .handle
                        .terminal_since()
                        .is_some_and(|since| since.elapsed() >= retention)
            })
            .map(|(id, live)| (*id, live.handle.clone()))
            .collect();
        if expired.is_empty() {
            return;
        }

        // The task has ended, so these are the last events it will ever emit
        for (_, handle) in &expired {
            for event in handle.poll_events() {
                self.dispatch(handle, event);
            }
        }

        let mut agents = self.inner.agents.write();
        for (agent_id, handle) in expired {
            let Some(live) = agents.live.remove(&agent_id) else {
                continue;
            };
            self.inner.hub.forget(agent_id);
            debug!(agent_id = %agent_id, "Reaped terminated agent");
            agents.tombstones.insert(
                agent_id,
                Tombstone {
                    info: handle.info().clone(),
                    status: handle.status(),
                    journal: live.journal,
                },
            );
        }
        metrics::gauge!("research_hub_live_agents").set(agents.live.len() as f64);
    }

    /// Run the supervisor loop on a background task until `shutdown`.
    pub fn start(&self) {
        let mut task = self.inner.supervisor_task.lock();
        if task.is_some() {
            return;
        }
        let runtime = self.clone();
        let tick = self.inner.settings.supervisor_tick();
        *task = Some(tokio::spawn(async move {
            info!("Supervisor loop started");
            loop {
                tokio::select! {
                    _ = runtime.inner.shutdown.cancelled() => break,
                    _ = runtime.inner.supervisor.notified() => {}
                    _ = tokio::time::sleep(tick) => {}
                }
                runtime.pump();
            }
            runtime.pump();
            info!("Supervisor loop stopped");
        }));
    }

    /// Stop every live agent concurrently, flush their last events and end
    /// the supervisor loop.
    pub async fn shutdown(&self, grace: Duration) {
        let ids: Vec<AgentId> = {
            let mut agents = self.inner.agents.write();
            agents.closing = true;
            agents.live.keys().copied().collect()
        };
        info!(agents = ids.len(), "Shutting down runtime");

        let stops = ids.into_iter().map(|id| {
            let runtime = self.clone();
            async move {
                if let Err(e) = runtime.stop(id, grace).await {
                    warn!(agent_id = %id, error = %e, "Stop during shutdown failed");
                }
            }
        });
        futures::future::join_all(stops).await;

        self.pump();
        self.inner.shutdown.cancel();
        let task = self.inner.supervisor_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Supervisor loop ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::{StepContext, StepResult};
    use crate::domain::runtime::AgentError;
    use async_trait::async_trait;

    struct Idle;

    #[async_trait]
    impl AgentBehavior for Idle {
        async fn step(&mut self, _ctx: &StepContext) -> Result<StepResult, AgentError> {
            Ok(StepResult::Idle)
        }
    }

    fn runtime(retention_secs: u64) -> Runtime {
        let mut registry = AgentRegistry::new();
        registry.register("idle", |_spec| Ok(Box::new(Idle) as Box<dyn AgentBehavior>));
        Runtime::builder()
            .settings(RuntimeConfig {
                retention_secs,
                ..RuntimeConfig::default()
            })
            .registry(registry)
            .build()
    }

    #[tokio::test]
    async fn test_reaped_agents_become_tombstones() {
        let rt = runtime(0);
        let id = rt.spawn(AgentSpec::new("idle")).unwrap();
        rt.stop(id, Duration::from_secs(2)).await.unwrap();

        // Let the worker task finish so the handle can be reaped
        for _ in 0..50 {
            rt.pump();
            if rt.view(id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rt.view(id).is_none());
        assert_eq!(rt.status(id), Some(AgentStatus::Stopped));
        assert!(matches!(
            rt.steer(id, Steer::high("late", "ui")),
            Err(RuntimeError::AgentTerminated(_))
        ));
        rt.stop(id, Duration::from_secs(1)).await.unwrap();
        assert!(rt.history(id).unwrap().is_empty());
    }

    struct Spawner;

    #[async_trait]
    impl AgentBehavior for Spawner {
        async fn on_start(&mut self, ctx: &StepContext) -> Result<(), AgentError> {
            ctx.request_spawn(AgentSpec::new("idle").with_name("late-child"));
            Ok(())
        }

        async fn step(&mut self, _ctx: &StepContext) -> Result<StepResult, AgentError> {
            Ok(StepResult::Idle)
        }
    }

    #[tokio::test]
    async fn test_shutdown_refuses_pending_spawn_requests() {
        let mut registry = AgentRegistry::new();
        registry.register("idle", |_spec| Ok(Box::new(Idle) as Box<dyn AgentBehavior>));
        registry.register("spawner", |_spec| Ok(Box::new(Spawner) as Box<dyn AgentBehavior>));
        let rt = Runtime::builder().registry(registry).build();

        // No supervisor loop: the SPAWN_REQUEST is still queued at shutdown
        let spawner = rt.spawn(AgentSpec::new("spawner")).unwrap();
        // Let on_start run and queue its request
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rt.inner.agents.read().live.contains_key(&spawner));

        rt.shutdown(Duration::from_secs(1)).await;

        let agents = rt.agents();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].status, AgentStatus::Stopped);
        assert!(rt.all_terminal());
        assert!(matches!(
            rt.spawn(AgentSpec::new("idle")),
            Err(RuntimeError::SpawnValidation(_))
        ));
    }

    #[tokio::test]
    async fn test_route_message_validation() {
        let rt = runtime(300);
        let a = rt.spawn(AgentSpec::new("idle")).unwrap();
        assert!(matches!(
            rt.route_message(a, Route::Scope(Scope::Direct), "x"),
            Err(RuntimeError::InvalidRoute(_))
        ));
        assert!(matches!(
            rt.route_message(a, Route::Agent(AgentId::new()), "x"),
            Err(RuntimeError::UnknownAgent(_))
        ));
        assert!(matches!(
            rt.route_message(AgentId::new(), Route::Scope(Scope::Global), "x"),
            Err(RuntimeError::UnknownAgent(_))
        ));
        let entry = rt.route_message(a, Route::Scope(Scope::Global), "hello").unwrap();
        assert_eq!(entry.agent_id, a);
        assert_eq!(rt.history(a).unwrap(), vec![entry]);
        rt.shutdown(Duration::from_secs(1)).await;
    }
}
