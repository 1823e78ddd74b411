// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Entry Store Infrastructure Module
//!
//! Concrete [`EntryStore`] backends and the factory that picks one per agent
//! from the hub configuration.
//!
//! On-disk layout for the file backend:
//!
//! ```text
//! <root_dir>/agents/<agent_id>/entries.jsonl
//! ```

pub mod file;
pub mod memory;

pub use file::FileEntryStore;
pub use memory::InMemoryEntryStore;

use crate::domain::agent::AgentId;
use crate::domain::entry::Entry;
use crate::domain::node_config::{StorageBackend, StorageConfig};
use crate::domain::repository::{EntryStore, StoreError};
use std::path::{Path, PathBuf};

/// Opens one entry store per agent.
#[derive(Debug, Clone)]
pub enum StoreFactory {
    /// Append-only JSON-lines files under `root`
    File { root: PathBuf },

    /// Volatile stores, lost when the process exits
    Memory,
}

impl StoreFactory {
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.backend {
            StorageBackend::File => Self::File {
                root: config.root_dir.clone(),
            },
            StorageBackend::Memory => Self::Memory,
        }
    }

    pub fn agent_log_path(root: &Path, agent_id: AgentId) -> PathBuf {
        root.join("agents")
            .join(agent_id.to_string())
            .join("entries.jsonl")
    }

    pub fn open(&self, agent_id: AgentId) -> Result<Box<dyn EntryStore>, StoreError> {
        match self {
            Self::File { root } => Ok(Box::new(FileEntryStore::open(Self::agent_log_path(
                root, agent_id,
            ))?)),
            Self::Memory => Ok(Box::new(InMemoryEntryStore::new())),
        }
    }

    /// Replay a persisted log without opening it for writing. `None` when the
    /// backend keeps nothing on disk or the agent never wrote an entry.
    pub fn replay(&self, agent_id: AgentId) -> Result<Option<Vec<Entry>>, StoreError> {
        match self {
            Self::File { root } => {
                let path = Self::agent_log_path(root, agent_id);
                if !path.exists() {
                    return Ok(None);
                }
                file::read_entries(&path).map(|(entries, _)| Some(entries))
            }
            Self::Memory => Ok(None),
        }
    }
}
