// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::entry::Entry;
use crate::domain::repository::{EntryStore, StoreError};
use chrono::{DateTime, Utc};

/// Volatile entry store for tests and ephemeral runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEntryStore {
    entries: Vec<Entry>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn append(&mut self, entry: &Entry) -> Result<(), StoreError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self.entries.clone())
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|entry| entry.timestamp)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
