//! Priority dispatch queue — four FIFO buckets and a single in-flight slot.
//!
//! Strict priority preemption with FIFO fairness inside a bucket. Pickup is
//! idempotent: while an item is in flight, `next()` keeps returning it, so
//! at-least-once callers that lost a response can safely re-read. The slot
//! clears only on an `ack` carrying the matching id.
//!
//! No starvation protection across priorities — priority aging is the
//! caller's policy, not this queue's.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::task::Priority;

/// A unit of dispatch-ready work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub priority: Priority,
}

impl QueueItem {
    pub fn new(id: &str, priority: Priority) -> Self {
        Self {
            id: id.to_string(),
            priority,
        }
    }
}

/// Depth and throughput counters for one priority bucket.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub priority: Priority,
    pub queued: usize,
    pub dispatched: u64,
}

struct QueueState {
    buckets: [VecDeque<QueueItem>; 4],
    in_flight: Option<QueueItem>,
    dispatched: [u64; 4],
    acked: u64,
}

/// In-memory, priority-ordered dispatch queue.
///
/// This is a scheduling cache, not the system of record: after a restart the
/// ready set is re-derived from persisted state.
pub struct DispatchQueue {
    state: Mutex<QueueState>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                buckets: [const { VecDeque::new() }; 4],
                in_flight: None,
                dispatched: [0; 4],
                acked: 0,
            }),
        }
    }

    /// Append an item to the tail of its priority bucket.
    pub fn add(&self, item: QueueItem) -> Result<()> {
        if item.id.is_empty() {
            return Err(DispatchError::EmptyTaskId);
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let idx = item.priority.rank();
        tracing::debug!(
            id = %item.id,
            priority = %item.priority,
            depth = state.buckets[idx].len(),
            "enqueue"
        );
        state.buckets[idx].push_back(item);
        Ok(())
    }

    /// Return the next item to dispatch.
    ///
    /// If an item is already in flight it is returned again unchanged.
    /// Otherwise the head of the most urgent non-empty bucket is popped and
    /// becomes the in-flight item. `None` means all buckets are empty.
    pub fn next(&self) -> Option<QueueItem> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = &state.in_flight {
            return Some(item.clone());
        }
        for idx in 0..state.buckets.len() {
            if let Some(item) = state.buckets[idx].pop_front() {
                state.dispatched[idx] += 1;
                state.in_flight = Some(item.clone());
                tracing::debug!(id = %item.id, priority = %item.priority, "dispatch");
                return Some(item);
            }
        }
        None
    }

    /// Acknowledge the in-flight item. Returns `false` (and does nothing)
    /// when `id` does not match the current in-flight item — this guards
    /// against acking a stale or foreign item.
    pub fn ack(&self, id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let matched = state.in_flight.as_ref().is_some_and(|item| item.id == id);
        if matched {
            state.in_flight = None;
            state.acked += 1;
            tracing::debug!(id, "ack");
        }
        matched
    }

    /// The current in-flight item, if any.
    pub fn in_flight(&self) -> Option<QueueItem> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight.clone()
    }

    /// Pending items across all buckets (excludes the in-flight item).
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total items acknowledged since creation.
    pub fn acked(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.acked
    }

    /// Per-priority depth and dispatch counters, most urgent first.
    pub fn stats(&self) -> Vec<QueueStats> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Priority::ALL
            .iter()
            .map(|p| QueueStats {
                priority: *p,
                queued: state.buckets[p.rank()].len(),
                dispatched: state.dispatched[p.rank()],
            })
            .collect()
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue_returns_none() {
        let queue = DispatchQueue::new();
        assert!(queue.next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_id_rejected() {
        let queue = DispatchQueue::new();
        let err = queue.add(QueueItem::new("", Priority::Normal)).unwrap_err();
        assert!(matches!(err, DispatchError::EmptyTaskId));
    }

    #[test]
    fn test_priority_preemption_with_fifo_ties() {
        // {A,P1,t0}, {B,P0,t0+1}, {C,P1,t0+2} must come out B, A, C.
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("A", Priority::High)).unwrap();
        queue.add(QueueItem::new("B", Priority::Critical)).unwrap();
        queue.add(QueueItem::new("C", Priority::High)).unwrap();

        for expected in ["B", "A", "C"] {
            let item = queue.next().unwrap();
            assert_eq!(item.id, expected);
            assert!(queue.ack(&item.id));
        }
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_pickup_is_idempotent() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("A", Priority::Normal)).unwrap();
        queue.add(QueueItem::new("B", Priority::Normal)).unwrap();

        let first = queue.next().unwrap();
        let again = queue.next().unwrap();
        assert_eq!(first, again);

        assert!(queue.ack(&first.id));
        let third = queue.next().unwrap();
        assert_eq!(third.id, "B");
    }

    #[test]
    fn test_ack_wrong_id_is_noop() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("A", Priority::Normal)).unwrap();

        let item = queue.next().unwrap();
        assert!(!queue.ack("stale-id"));
        // Still in flight; next() re-reads it.
        assert_eq!(queue.next().unwrap(), item);
        assert!(queue.ack("A"));
        assert!(queue.in_flight().is_none());
    }

    #[test]
    fn test_ack_without_pickup_is_noop() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("A", Priority::Normal)).unwrap();
        assert!(!queue.ack("A"));
    }

    #[test]
    fn test_higher_priority_added_later_still_wins() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("low", Priority::Low)).unwrap();
        queue.add(QueueItem::new("crit", Priority::Critical)).unwrap();

        assert_eq!(queue.next().unwrap().id, "crit");
    }

    // Deliberate non-goal: a steady stream of high-priority work will starve
    // lower buckets. Priority aging belongs to the caller.
    #[test]
    fn test_no_starvation_protection_across_priorities() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("old-low", Priority::Low)).unwrap();
        for i in 0..10 {
            queue
                .add(QueueItem::new(&format!("high-{i}"), Priority::High))
                .unwrap();
        }
        for i in 0..10 {
            let item = queue.next().unwrap();
            assert_eq!(item.id, format!("high-{i}"));
            queue.ack(&item.id);
        }
        assert_eq!(queue.next().unwrap().id, "old-low");
    }

    #[test]
    fn test_stats_counters() {
        let queue = DispatchQueue::new();
        queue.add(QueueItem::new("a", Priority::Critical)).unwrap();
        queue.add(QueueItem::new("b", Priority::Low)).unwrap();
        queue.add(QueueItem::new("c", Priority::Low)).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.len(), 4);
        assert_eq!(stats[0].queued, 1); // critical
        assert_eq!(stats[3].queued, 2); // low

        let item = queue.next().unwrap();
        queue.ack(&item.id);

        let stats = queue.stats();
        assert_eq!(stats[0].queued, 0);
        assert_eq!(stats[0].dispatched, 1);
        assert_eq!(queue.acked(), 1);
        assert_eq!(queue.len(), 2);
    }
}
