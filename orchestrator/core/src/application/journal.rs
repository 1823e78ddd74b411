// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::application::child_handle::EventSink;
use crate::application::memory::{MemoryHub, SharedStore};
use crate::domain::agent::AgentId;
use crate::domain::entry::{Entry, EntryType, Scope};
use crate::domain::ipc::Event;
use crate::domain::repository::StoreError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Write path for one agent's entries: durable append, then view fan-out,
/// then a LOG_ENTRY event to the supervisor.
///
/// Writers (the agent's worker and the runtime routing on the agent's
/// behalf) hold `write` across all three steps, so every reader observes
/// entries in append order. Lock order is `write`, then store, then hub.
#[derive(Clone)]
pub struct AgentJournal {
    agent_id: AgentId,
    store: SharedStore,
    hub: Arc<MemoryHub>,
    events: EventSink,
    write: Arc<Mutex<()>>,
}

impl AgentJournal {
    pub fn new(agent_id: AgentId, store: SharedStore, hub: Arc<MemoryHub>, events: EventSink) -> Self {
        Self {
            agent_id,
            store,
            hub,
            events,
            write: Arc::new(Mutex::new(())),
        }
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Persist an entry authored by this agent. Its timestamp is raised to
    /// the log's last timestamp if the clock went backwards.
    pub fn append(&self, mut entry: Entry) -> Result<Entry, StoreError> {
        entry.agent_id = self.agent_id;
        let _write = self.write.lock();
        {
            let mut store = self.store.lock();
            if let Some(last) = store.last_timestamp() {
                if entry.timestamp < last {
                    entry = entry.with_timestamp(last);
                }
            }
            store.append(&entry)?;
        }
        self.hub.publish(&entry);
        self.events.send(Event::log_entry(self.agent_id, &entry));
        Ok(entry)
    }

    pub fn record(
        &self,
        entry_type: EntryType,
        scope: Scope,
        payload: serde_json::Value,
    ) -> Result<Entry, StoreError> {
        self.append(Entry::new(self.agent_id, entry_type, scope, payload))
    }

    pub fn send_to(
        &self,
        recipient: AgentId,
        entry_type: EntryType,
        payload: serde_json::Value,
    ) -> Result<Entry, StoreError> {
        self.append(Entry::direct(self.agent_id, recipient, entry_type, payload))
    }

    pub fn read_all(&self) -> Result<Vec<Entry>, StoreError> {
        self.store.lock().read_all()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mailbox::Mailbox;
    use crate::domain::ipc::EventType;
    use crate::domain::repository::EntryStore;
    use crate::infrastructure::store::InMemoryEntryStore;
    use chrono::{Duration, Utc};
    use tokio::sync::Notify;

    fn memory_store() -> SharedStore {
        let boxed: Box<dyn EntryStore> = Box::new(InMemoryEntryStore::new());
        Arc::new(Mutex::new(boxed))
    }

    fn mailbox() -> Arc<Mailbox> {
        Arc::new(Mailbox::new(Arc::new(Notify::new())))
    }

    #[test]
    fn test_append_clamps_timestamp_and_emits_log_entry() {
        let hub = Arc::new(MemoryHub::new(10));
        let agent = AgentId::new();
        let store = memory_store();
        let view = hub
            .register_agent(agent, None, store.clone(), mailbox())
            .unwrap();
        let (sink, mut events) = EventSink::channel(agent, Arc::new(Notify::new()));
        let journal = AgentJournal::new(agent, store, hub, sink);

        let first = journal
            .record(EntryType::Status, Scope::SelfOnly, serde_json::json!("a"))
            .unwrap();
        let stale = Entry::message(agent, Scope::SelfOnly, "late clock")
            .with_timestamp(Utc::now() - Duration::hours(1));
        let second = journal.append(stale).unwrap();

        assert!(second.timestamp >= first.timestamp);
        assert_eq!(view.len(), 2);
        assert_eq!(journal.len(), 2);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::LogEntry);
        assert_eq!(event.entry().unwrap(), first);
    }

    #[test]
    fn test_concurrent_writers_deliver_in_append_order() {
        let hub = Arc::new(MemoryHub::new(1000));
        let author = AgentId::new();
        let reader = AgentId::new();
        let store = memory_store();
        hub.register_agent(author, None, store.clone(), mailbox()).unwrap();
        let inbox = mailbox();
        hub.register_agent(reader, None, memory_store(), inbox.clone())
            .unwrap();
        let (sink, _events) = EventSink::channel(author, Arc::new(Notify::new()));
        let journal = AgentJournal::new(author, store, hub, sink);

        let writers: Vec<_> = ["worker", "router"]
            .into_iter()
            .map(|name| {
                let journal = journal.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        journal
                            .append(Entry::message(author, Scope::Global, format!("{name}-{i}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let logged: Vec<_> = journal.read_all().unwrap().into_iter().map(|e| e.id).collect();
        let delivered: Vec<_> = std::iter::from_fn(|| inbox.pop()).map(|e| e.id).collect();
        assert_eq!(logged.len(), 400);
        assert_eq!(delivered, logged);
    }
}
