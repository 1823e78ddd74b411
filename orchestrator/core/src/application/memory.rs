// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Memory Hub & Views
//!
//! Every agent gets a [`MemoryView`]: a bounded, chronologically ordered
//! cache of the entries it is allowed to see (its own plus whatever other
//! agents' scopes expose to it). Views are seeded from the entry stores at
//! registration and then kept current by [`MemoryHub::publish`], which the
//! journal calls right after each durable append.
//!
//! The hub also owns the parent/child lineage used for `SUBTREE` visibility
//! and routes deliverable entries into recipients' mailboxes.
//!
//! Lock order: a store lock is never held while taking the hub lock.

use crate::application::mailbox::Mailbox;
use crate::domain::agent::AgentId;
use crate::domain::entry::{Ancestry, Entry, EntryId, EntryType, Scope};
use crate::domain::repository::{EntryStore, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// One agent's store, shared between its journal (writer) and the hub
/// (seeding reader).
pub type SharedStore = Arc<Mutex<Box<dyn EntryStore>>>;

/// Optional type/scope/author restriction for [`MemoryView::recent`].
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    types: Option<HashSet<EntryType>>,
    scopes: Option<HashSet<Scope>>,
    author: Option<AgentId>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = EntryType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes = Some(scopes.into_iter().collect());
        self
    }

    pub fn from_author(mut self, author: AgentId) -> Self {
        self.author = Some(author);
        self
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.types
            .as_ref()
            .is_none_or(|types| types.contains(&entry.entry_type))
            && self
                .scopes
                .as_ref()
                .is_none_or(|scopes| scopes.contains(&entry.scope))
            && self.author.is_none_or(|author| author == entry.agent_id)
    }
}

struct ViewCache {
    entries: VecDeque<Entry>,
    ids: HashSet<EntryId>,
    capacity: usize,
}

impl ViewCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert keeping timestamp order (stable for equal timestamps). Returns
    /// `false` for an entry already cached.
    fn insert(&mut self, entry: Entry) -> bool {
        if !self.ids.insert(entry.id) {
            return false;
        }
        let position = self
            .entries
            .iter()
            .rposition(|existing| existing.timestamp <= entry.timestamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.entries.insert(position, entry);

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }
        true
    }
}

/// Read-side projection of the entries one agent may see.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct MemoryView {
    owner: AgentId,
    cache: Arc<RwLock<ViewCache>>,
}

impl MemoryView {
    fn new(owner: AgentId, capacity: usize) -> Self {
        Self {
            owner,
            cache: Arc::new(RwLock::new(ViewCache::new(capacity))),
        }
    }

    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// The most recent `n` matching entries, oldest first.
    pub fn recent(&self, n: usize, filter: Option<&EntryFilter>) -> Vec<Entry> {
        let cache = self.cache.read();
        let mut picked: Vec<Entry> = cache
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.is_none_or(|f| f.matches(entry)))
            .take(n)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    pub fn len(&self) -> usize {
        self.cache.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, entry: Entry) -> bool {
        self.cache.write().insert(entry)
    }
}

#[derive(Default)]
struct Lineage {
    parents: HashMap<AgentId, Option<AgentId>>,
}

impl Ancestry for Lineage {
    fn is_descendant(&self, agent: AgentId, ancestor: AgentId) -> bool {
        let mut current = agent;
        // Bounded by the number of registered agents; ids are never reused
        // so the chain cannot cycle.
        for _ in 0..=self.parents.len() {
            match self.parents.get(&current).copied().flatten() {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}

struct Member {
    view: MemoryView,
    mailbox: Arc<Mailbox>,
    store: SharedStore,
}

#[derive(Default)]
struct HubState {
    lineage: Lineage,
    members: HashMap<AgentId, Member>,
}

pub struct MemoryHub {
    state: RwLock<HubState>,
    view_capacity: usize,
}

impl MemoryHub {
    pub fn new(view_capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            view_capacity,
        }
    }

    /// Add an agent to the lineage and build its view from every registered
    /// store. Nothing is mutated if seeding fails.
    pub fn register_agent(
        &self,
        agent_id: AgentId,
        parent: Option<AgentId>,
        store: SharedStore,
        mailbox: Arc<Mailbox>,
    ) -> Result<MemoryView, StoreError> {
        let mut state = self.state.write();
        state.lineage.parents.insert(agent_id, parent);

        let seeded = Self::seed(&state, agent_id, &store);
        let seeded = match seeded {
            Ok(entries) => entries,
            Err(e) => {
                state.lineage.parents.remove(&agent_id);
                return Err(e);
            }
        };

        let view = MemoryView::new(agent_id, self.view_capacity);
        for entry in seeded {
            view.insert(entry);
        }
        debug!(agent_id = %agent_id, seeded = view.len(), "Memory view registered");

        state.members.insert(
            agent_id,
            Member {
                view: view.clone(),
                mailbox,
                store,
            },
        );
        Ok(view)
    }

    fn seed(state: &HubState, viewer: AgentId, own: &SharedStore) -> Result<Vec<Entry>, StoreError> {
        let mut visible = own.lock().read_all()?;
        for (member_id, member) in &state.members {
            if *member_id == viewer {
                continue;
            }
            let entries = member.store.lock().read_all()?;
            visible.extend(
                entries
                    .into_iter()
                    .filter(|entry| entry.is_visible_to(viewer, &state.lineage)),
            );
        }
        visible.sort_by_key(|entry| entry.timestamp);
        Ok(visible)
    }

    /// Fan one durably appended entry out to every view allowed to see it,
    /// and to the mailboxes of non-author recipients of deliverable types.
    pub fn publish(&self, entry: &Entry) {
        let state = self.state.read();
        for (member_id, member) in &state.members {
            if !entry.is_visible_to(*member_id, &state.lineage) {
                continue;
            }
            let fresh = member.view.insert(entry.clone());
            if fresh && *member_id != entry.agent_id && entry.entry_type.is_deliverable() {
                member.mailbox.deliver(entry.clone());
            }
        }
    }

    pub fn view(&self, agent_id: AgentId) -> Option<MemoryView> {
        self.state
            .read()
            .members
            .get(&agent_id)
            .map(|member| member.view.clone())
    }

    pub fn parent_of(&self, agent_id: AgentId) -> Option<AgentId> {
        self.state
            .read()
            .lineage
            .parents
            .get(&agent_id)
            .copied()
            .flatten()
    }

    pub fn children_of(&self, agent_id: AgentId) -> Vec<AgentId> {
        self.state
            .read()
            .lineage
            .parents
            .iter()
            .filter(|(_, parent)| **parent == Some(agent_id))
            .map(|(child, _)| *child)
            .collect()
    }

    pub fn is_descendant(&self, agent: AgentId, ancestor: AgentId) -> bool {
        self.state.read().lineage.is_descendant(agent, ancestor)
    }

    /// Drop a reaped agent's view and mailbox. Its lineage link is kept so
    /// that descendants still resolve `SUBTREE` visibility through it.
    pub fn forget(&self, agent_id: AgentId) {
        self.state.write().members.remove(&agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::InMemoryEntryStore;
    use tokio::sync::Notify;

    fn member(hub: &MemoryHub, parent: Option<AgentId>) -> (AgentId, SharedStore, Arc<Mailbox>, MemoryView) {
        let id = AgentId::new();
        let boxed: Box<dyn EntryStore> = Box::new(InMemoryEntryStore::new());
        let store: SharedStore = Arc::new(Mutex::new(boxed));
        let mailbox = Arc::new(Mailbox::new(Arc::new(Notify::new())));
        let view = hub
            .register_agent(id, parent, store.clone(), mailbox.clone())
            .unwrap();
        (id, store, mailbox, view)
    }

    fn write(store: &SharedStore, hub: &MemoryHub, entry: Entry) {
        store.lock().append(&entry).unwrap();
        hub.publish(&entry);
    }

    #[test]
    fn test_views_respect_scope() {
        let hub = MemoryHub::new(100);
        let (root, root_store, _, root_view) = member(&hub, None);
        let (child, child_store, child_mail, child_view) = member(&hub, Some(root));
        let (_, _, stranger_mail, stranger_view) = member(&hub, None);

        write(&root_store, &hub, Entry::message(root, Scope::Subtree, "plan"));
        write(&child_store, &hub, Entry::message(child, Scope::SelfOnly, "scratch"));
        write(&child_store, &hub, Entry::message(child, Scope::Global, "hello all"));

        assert_eq!(root_view.len(), 2);
        assert_eq!(child_view.len(), 3);
        assert_eq!(stranger_view.len(), 1);
        assert_eq!(stranger_view.recent(10, None)[0].content(), Some("hello all"));

        // Deliverable entries land in other agents' mailboxes only
        assert_eq!(child_mail.len(), 1);
        assert_eq!(stranger_mail.len(), 1);
    }

    #[test]
    fn test_late_registration_is_seeded() {
        let hub = MemoryHub::new(100);
        let (root, root_store, _, _) = member(&hub, None);
        write(&root_store, &hub, Entry::message(root, Scope::Subtree, "before child"));
        write(&root_store, &hub, Entry::message(root, Scope::SelfOnly, "private"));

        let (_, _, mailbox, view) = member(&hub, Some(root));
        let contents: Vec<_> = view
            .recent(10, None)
            .iter()
            .filter_map(|e| e.content().map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["before child"]);
        // seeding does not replay into the mailbox
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_recent_filter_and_capacity() {
        let hub = MemoryHub::new(3);
        let (agent, store, _, view) = member(&hub, None);
        for i in 0..5 {
            write(&store, &hub, Entry::message(agent, Scope::SelfOnly, format!("m{i}")));
        }
        write(
            &store,
            &hub,
            Entry::new(agent, EntryType::Status, Scope::SelfOnly, serde_json::json!("idle")),
        );

        assert_eq!(view.len(), 3);
        let messages = view.recent(10, Some(&EntryFilter::new().with_types([EntryType::Message])));
        let contents: Vec<_> = messages.iter().filter_map(|e| e.content()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let last_two = view.recent(2, None);
        assert_eq!(last_two[0].content(), Some("m4"));
        assert_eq!(last_two[1].entry_type, EntryType::Status);
    }

    #[test]
    fn test_direct_entries_reach_only_recipient() {
        let hub = MemoryHub::new(100);
        let (parent, _, parent_mail, parent_view) = member(&hub, None);
        let (child, child_store, _, _) = member(&hub, Some(parent));
        let (_, _, sibling_mail, sibling_view) = member(&hub, Some(parent));

        write(
            &child_store,
            &hub,
            Entry::direct(child, parent, EntryType::Result, serde_json::json!({"score": 0.9})),
        );

        assert_eq!(parent_view.len(), 1);
        assert_eq!(parent_mail.len(), 1);
        assert!(sibling_view.is_empty());
        assert!(sibling_mail.is_empty());
        assert!(hub.is_descendant(child, parent));
        assert_eq!(hub.children_of(parent).len(), 2);
    }
}
