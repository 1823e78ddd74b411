// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Steer Buffer
//!
//! Bounded, priority-ordered queue of pending [`Steer`]s for one agent.
//! Written by the runtime (any task), drained by the agent's worker at each
//! step boundary. `push` never blocks.
//!
//! ## Overflow policy
//!
//! When the buffer is full:
//! 1. evict the oldest steer of the lowest urgency below `HIGH`, then accept;
//! 2. if only `HIGH` steers are queued, a `HIGH` steer is still accepted
//!    (the buffer grows past capacity) and anything lower is rejected.
//!
//! A `HIGH` steer is never dropped by overflow.
//!
//! ## Closing
//!
//! The worker closes the buffer when it reaches a terminal state. Later
//! pushes come back as [`SteerAdmission::Closed`]. Whatever was still
//! queued stays until the runtime drains it and reports it as dropped.

use crate::domain::entry::{Steer, SteerUrgency};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Outcome of offering a steer to a full or non-full buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SteerAdmission {
    Accepted,
    /// Accepted after dropping an older, less urgent steer
    AcceptedEvicting(Steer),
    /// Buffer full of more urgent steers; the offered steer was dropped
    Rejected(Steer),
    /// The agent already terminated
    Closed(Steer),
}

impl SteerAdmission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::AcceptedEvicting(_))
    }
}

struct Slot {
    seq: u64,
    steer: Steer,
}

struct Inner {
    slots: VecDeque<Slot>,
    next_seq: u64,
    closed: bool,
}

pub struct SteerBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    wake: Arc<Notify>,
}

impl SteerBuffer {
    pub fn new(capacity: usize, wake: Arc<Notify>) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                slots: VecDeque::with_capacity(capacity),
                next_seq: 0,
                closed: false,
            }),
            wake,
        }
    }

    pub fn push(&self, steer: Steer) -> SteerAdmission {
        let admission = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return SteerAdmission::Closed(steer);
            }
            let mut admission = SteerAdmission::Accepted;

            if inner.slots.len() >= self.capacity {
                match Self::eviction_candidate(&inner.slots) {
                    Some(index) if inner.slots[index].steer.urgency <= steer.urgency => {
                        if let Some(evicted) = inner.slots.remove(index) {
                            admission = SteerAdmission::AcceptedEvicting(evicted.steer);
                        }
                    }
                    _ if steer.urgency == SteerUrgency::High => {}
                    _ => return SteerAdmission::Rejected(steer),
                }
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.slots.push_back(Slot { seq, steer });
            admission
        };
        self.wake.notify_one();
        admission
    }

    /// Oldest steer of the lowest non-HIGH urgency.
    fn eviction_candidate(slots: &VecDeque<Slot>) -> Option<usize> {
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.steer.urgency < SteerUrgency::High)
            .min_by_key(|(_, slot)| (slot.steer.urgency, slot.seq))
            .map(|(index, _)| index)
    }

    /// Most urgent steer, FIFO within one urgency level.
    pub fn pop(&self) -> Option<Steer> {
        let mut inner = self.inner.lock();
        let index = inner
            .slots
            .iter()
            .enumerate()
            .max_by_key(|(_, slot)| (slot.steer.urgency, std::cmp::Reverse(slot.seq)))
            .map(|(index, _)| index)?;
        inner.slots.remove(index).map(|slot| slot.steer)
    }

    /// Remove everything, most urgent first.
    pub fn drain(&self) -> Vec<Steer> {
        let mut drained = Vec::new();
        while let Some(steer) = self.pop() {
            drained.push(steer);
        }
        drained
    }

    /// Refuse further steers. Queued ones stay until drained.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steer(urgency: SteerUrgency, content: &str) -> Steer {
        Steer::new(urgency, content, "test")
    }

    fn buffer(capacity: usize) -> SteerBuffer {
        SteerBuffer::new(capacity, Arc::new(Notify::new()))
    }

    #[test]
    fn test_pop_orders_by_urgency_then_arrival() {
        let buffer = buffer(8);
        buffer.push(steer(SteerUrgency::Low, "l1"));
        buffer.push(steer(SteerUrgency::Normal, "n1"));
        buffer.push(steer(SteerUrgency::High, "h1"));
        buffer.push(steer(SteerUrgency::Normal, "n2"));
        buffer.push(steer(SteerUrgency::High, "h2"));

        let order: Vec<_> = buffer.drain().into_iter().map(|s| s.content).collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2", "l1"]);
    }

    #[test]
    fn test_overflow_evicts_oldest_lowest_urgency() {
        let buffer = buffer(3);
        buffer.push(steer(SteerUrgency::Normal, "n1"));
        buffer.push(steer(SteerUrgency::Low, "l1"));
        buffer.push(steer(SteerUrgency::Low, "l2"));

        let admission = buffer.push(steer(SteerUrgency::Normal, "n2"));
        assert_eq!(
            admission,
            SteerAdmission::AcceptedEvicting(steer(SteerUrgency::Low, "l1"))
        );
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_high_is_never_dropped() {
        let buffer = buffer(2);
        buffer.push(steer(SteerUrgency::High, "h1"));
        buffer.push(steer(SteerUrgency::High, "h2"));

        assert_eq!(buffer.push(steer(SteerUrgency::High, "h3")), SteerAdmission::Accepted);
        assert_eq!(buffer.len(), 3);

        let rejected = buffer.push(steer(SteerUrgency::Low, "l1"));
        assert_eq!(rejected, SteerAdmission::Rejected(steer(SteerUrgency::Low, "l1")));

        let order: Vec<_> = buffer.drain().into_iter().map(|s| s.content).collect();
        assert_eq!(order, vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn test_low_cannot_evict_more_urgent() {
        let buffer = buffer(1);
        buffer.push(steer(SteerUrgency::Normal, "n1"));
        assert!(!buffer.push(steer(SteerUrgency::Low, "l1")).is_accepted());
        assert_eq!(buffer.pop().unwrap().content, "n1");
    }

    #[test]
    fn test_close_refuses_pushes_and_keeps_leftovers() {
        let buffer = buffer(4);
        buffer.push(steer(SteerUrgency::Low, "l1"));
        buffer.push(steer(SteerUrgency::High, "h1"));

        buffer.close();
        assert!(buffer.is_closed());

        let late = buffer.push(steer(SteerUrgency::High, "h2"));
        assert_eq!(late, SteerAdmission::Closed(steer(SteerUrgency::High, "h2")));
        assert!(!late.is_accepted());

        let leftover: Vec<_> = buffer.drain().into_iter().map(|s| s.content).collect();
        assert_eq!(leftover, vec!["h1", "l1"]);
    }

    #[tokio::test]
    async fn test_push_wakes_worker() {
        let wake = Arc::new(Notify::new());
        let buffer = SteerBuffer::new(4, wake.clone());
        buffer.push(Steer::high("stop early", "ui"));
        // notify_one stores a permit when nobody is waiting yet
        tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }
}
