// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::entry::Entry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// FIFO of deliverable entries (MESSAGE, RESULT, ERROR) addressed to one
/// agent by others. Filled by the memory hub, drained by the worker.
pub struct Mailbox {
    queue: Mutex<VecDeque<Entry>>,
    wake: Arc<Notify>,
}

impl Mailbox {
    pub fn new(wake: Arc<Notify>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            wake,
        }
    }

    pub fn deliver(&self, entry: Entry) {
        self.queue.lock().push_back(entry);
        self.wake.notify_one();
    }

    pub fn pop(&self) -> Option<Entry> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::entry::Scope;

    #[test]
    fn test_fifo() {
        let mailbox = Mailbox::new(Arc::new(Notify::new()));
        let sender = AgentId::new();
        for i in 0..3 {
            mailbox.deliver(Entry::message(sender, Scope::Global, format!("m{i}")));
        }
        let order: Vec<_> = std::iter::from_fn(|| mailbox.pop())
            .map(|e| e.content().unwrap_or_default().to_string())
            .collect();
        assert_eq!(order, vec!["m0", "m1", "m2"]);
        assert!(mailbox.is_empty());
    }
}
