// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Append-only JSON-lines entry store.
//!
//! One record per line, each line written with a single `write_all` and
//! followed by `sync_data` before `append` returns. A crash mid-append can
//! only leave a trailing fragment without a newline; `open` truncates it and
//! replay ignores it. A malformed line anywhere else is reported as
//! [`StoreError::Corrupt`].
//!
//! A failed append is rolled back to the last committed length. If even the
//! rollback fails, the next append truncates the fragment before writing, so
//! a failed write never glues itself onto a later record.

use crate::domain::entry::Entry;
use crate::domain::repository::{EntryStore, StoreError};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct FileEntryStore {
    path: PathBuf,
    file: File,
    /// Byte length of the log up to the last synced record
    committed_len: u64,
    last_timestamp: Option<DateTime<Utc>>,
    count: usize,
}

impl FileEntryStore {
    /// Open (or create) the log at `path`, recovering the tail state from
    /// whatever is already on disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let write_err = |source| StoreError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let (entries, valid_len) = if path.exists() {
            read_entries(&path)?
        } else {
            (Vec::new(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;

        let on_disk = file.metadata().map_err(write_err)?.len();
        if on_disk > valid_len {
            warn!(
                path = %path.display(),
                dropped_bytes = on_disk - valid_len,
                "Truncating partial record left by an interrupted append"
            );
            file.set_len(valid_len).map_err(write_err)?;
        }

        Ok(Self {
            last_timestamp: entries.last().map(|entry| entry.timestamp),
            count: entries.len(),
            committed_len: valid_len,
            path,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EntryStore for FileEntryStore {
    fn append(&mut self, entry: &Entry) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let path = &self.path;
        let write_err = |source| StoreError::Write {
            path: path.clone(),
            source,
        };

        let on_disk = self.file.metadata().map_err(write_err)?.len();
        if on_disk > self.committed_len {
            warn!(
                path = %path.display(),
                dropped_bytes = on_disk - self.committed_len,
                "Discarding bytes left by a failed append"
            );
            self.file.set_len(self.committed_len).map_err(write_err)?;
        }

        if let Err(e) = write_synced(&mut self.file, &line) {
            if let Err(rollback) = self.file.set_len(self.committed_len) {
                warn!(path = %path.display(), error = %rollback, "Could not roll back failed append");
            }
            return Err(write_err(e));
        }

        self.committed_len += line.len() as u64;
        self.last_timestamp = Some(entry.timestamp);
        self.count += 1;
        metrics::counter!("research_hub_store_appends_total").increment(1);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Entry>, StoreError> {
        read_entries(&self.path).map(|(entries, _)| entries)
    }

    fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    fn len(&self) -> usize {
        self.count
    }
}

fn write_synced(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync_data()
}

/// Parse every complete line of the log. Returns the entries and the byte
/// length of the complete-line prefix.
pub(crate) fn read_entries(path: &Path) -> Result<(Vec<Entry>, u64), StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let complete_len = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let mut entries = Vec::new();
    for (index, line) in content[..complete_len].lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }

    Ok((entries, complete_len as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::entry::{EntryType, Scope};

    fn log_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("agent").join("entries.jsonl")
    }

    #[test]
    fn test_replay_after_reopen_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentId::new();
        let mut written = Vec::new();

        {
            let mut store = FileEntryStore::open(log_path(&dir)).unwrap();
            for i in 0..25 {
                let entry = Entry::message(agent, Scope::Subtree, format!("m{i}"));
                store.append(&entry).unwrap();
                written.push(entry);
            }
        }

        let reopened = FileEntryStore::open(log_path(&dir)).unwrap();
        assert_eq!(reopened.len(), 25);
        assert_eq!(reopened.last_timestamp(), written.last().map(|e| e.timestamp));
        assert_eq!(reopened.read_all().unwrap(), written);
    }

    #[test]
    fn test_read_since() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentId::new();
        let mut store = FileEntryStore::open(log_path(&dir)).unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let entry = Entry::new(agent, EntryType::Iteration, Scope::SelfOnly, serde_json::json!(i))
                .with_timestamp(base + chrono::Duration::milliseconds(i * 10));
            store.append(&entry).unwrap();
        }

        let tail = store.read_since(base + chrono::Duration::milliseconds(20)).unwrap();
        let values: Vec<_> = tail.iter().map(|e| e.payload.as_i64().unwrap()).collect();
        assert_eq!(values, vec![3, 4]);
    }

    #[test]
    fn test_torn_tail_is_ignored_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentId::new();
        let path = log_path(&dir);

        {
            let mut store = FileEntryStore::open(&path).unwrap();
            store.append(&Entry::message(agent, Scope::Global, "kept")).unwrap();
        }
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(br#"{"id":"half-writ"#).unwrap();
        }

        let mut store = FileEntryStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        store.append(&Entry::message(agent, Scope::Global, "after")).unwrap();

        let contents: Vec<_> = store
            .read_all()
            .unwrap()
            .iter()
            .filter_map(|e| e.content().map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["kept", "after"]);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let agent = AgentId::new();
        {
            let mut store = FileEntryStore::open(&path).unwrap();
            store.append(&Entry::message(agent, Scope::Global, "one")).unwrap();
        }
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(b"not json\n").unwrap();
        }

        match FileEntryStore::open(&path) {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("corrupt log opened cleanly"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_append_failure_surfaces_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut store = FileEntryStore::open(&path).unwrap();

        // Swap the handle for a read-only one so the next write fails
        store.file = File::open(&path).unwrap();
        let err = store
            .append(&Entry::message(AgentId::new(), Scope::Global, "lost"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(store.len(), 0);

        store.file = OpenOptions::new().append(true).open(&path).unwrap();
        let agent = AgentId::new();
        store.append(&Entry::message(agent, Scope::Global, "kept")).unwrap();
        assert_eq!(store.len(), 1);

        let reopened = FileEntryStore::open(&path).unwrap();
        let contents: Vec<_> = reopened
            .read_all()
            .unwrap()
            .iter()
            .filter_map(|e| e.content().map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["kept"]);
    }

    #[test]
    fn test_fragment_from_failed_append_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let agent = AgentId::new();
        let mut store = FileEntryStore::open(&path).unwrap();
        store.append(&Entry::message(agent, Scope::Global, "one")).unwrap();

        // What a write cut short by a full disk leaves behind
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(br#"{"id":"cut-sh"#).unwrap();
        }
        store.append(&Entry::message(agent, Scope::Global, "two")).unwrap();

        let contents: Vec<_> = FileEntryStore::open(&path)
            .unwrap()
            .read_all()
            .unwrap()
            .iter()
            .filter_map(|e| e.content().map(str::to_string))
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
