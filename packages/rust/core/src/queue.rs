//! Shared FIFO of records waiting for a lookup.
//!
//! Records move through the queue by value: [`TaskQueue::try_pop`] hands a
//! record to exactly one worker, which owns it until it gives it back with
//! [`TaskQueue::complete`]. The queue counts checked-out records so that
//! [`TaskQueue::is_drained`] only turns true once nothing is pending and no
//! worker is still holding a record.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use assetenrich_shared::Record;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Record>,
    in_flight: usize,
    completed: Vec<Record>,
}

/// Work queue shared by the worker pool.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue holding `records` in iteration order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let queue = Self::new();
        queue.lock().pending.extend(records);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking worker cannot leave the state half-updated: every
        // critical section is a single push/pop plus a counter change.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record to the back of the queue.
    pub fn push(&self, record: Record) {
        self.lock().pending.push_back(record);
    }

    /// Take the next record, or `None` if nothing is pending.
    ///
    /// The caller must hand the record back with [`complete`](Self::complete).
    pub fn try_pop(&self) -> Option<Record> {
        let mut state = self.lock();
        let record = state.pending.pop_front()?;
        state.in_flight += 1;
        Some(record)
    }

    /// Return a checked-out record once its processing is finished.
    pub fn complete(&self, record: Record) {
        let mut state = self.lock();
        debug_assert!(state.in_flight > 0, "complete() without a matching try_pop()");
        state.in_flight = state.in_flight.saturating_sub(1);
        state.completed.push(record);
    }

    /// True once nothing is pending and nothing is checked out.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of records currently held by workers.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Take every completed record out of the queue, in completion order.
    pub fn take_completed(&self) -> Vec<Record> {
        std::mem::take(&mut self.lock().completed)
    }
}
