// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Entry Store Interface
//!
//! Persistence contract for one agent's entry stream. One store per agent,
//! written by that agent only, read by anyone authorized.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | `FileEntryStore` | append-only JSON-lines file, fsync per append |
//! | `InMemoryEntryStore` | `Vec`, for tests and ephemeral runs |
//!
//! The backend is chosen from `spec.storage.backend` in the hub config.

use crate::domain::entry::Entry;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub trait EntryStore: Send + Sync {
    /// Persist one entry. Returns only after the entry is durable.
    fn append(&mut self, entry: &Entry) -> Result<(), StoreError>;

    /// Every entry in append order.
    fn read_all(&self) -> Result<Vec<Entry>, StoreError>;

    /// Entries with `timestamp` strictly greater than `since`, in append order.
    fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<Entry>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|entry| entry.timestamp > since)
            .collect())
    }

    /// Timestamp of the last appended entry, used to keep the log
    /// non-decreasing.
    fn last_timestamp(&self) -> Option<DateTime<Utc>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store read failed for {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
