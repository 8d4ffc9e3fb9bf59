//! # Pending-event priority queue.
//!
//! A max-heap keyed by 8-bit priority descending, ties broken FIFO via the
//! event's creation sequence number. The queue itself is not synchronized;
//! the dispatcher wraps it in a short-held lock, and producers never wait
//! on handlers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::event::Event;

/// Heap entry ordering: priority descending, then seq ascending.
struct Queued(Arc<Event>);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.seq == other.0.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// Priority queue of events awaiting dispatch.
#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Queued>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event; never blocks.
    pub(crate) fn push(&mut self, event: Arc<Event>) {
        self.heap.push(Queued(event));
    }

    /// Returns the priority of the most urgent pending event.
    pub(crate) fn peek_priority(&self) -> Option<u8> {
        self.heap.peek().map(|q| q.0.priority)
    }

    /// Removes and returns the most urgent pending event.
    pub(crate) fn pop(&mut self) -> Option<Arc<Event>> {
        self.heap.pop().map(|q| q.0)
    }

    /// Drops every pending event, returning how many were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }
}
