//! Lock-and-condition guarded FIFO of owned messages.
//!
//! One type serves both directions. Producers `push`, consumers `pop`; the
//! send worker uses `take_for_io`/`complete_io` instead of `pop` so that
//! `wait_drained` can tell "queued" apart from "written". No method ever holds
//! the lock across socket I/O.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use crate::config::BackpressurePolicy;

/// Why a push did not enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Bounded queue at capacity under `BackpressurePolicy::Reject`.
    Full,
    /// The queue was closed.
    Closed,
}

/// Outcome of a non-blocking or timed pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    Item(Bytes),
    /// Nothing available (or the timeout elapsed).
    Empty,
    /// Closed and fully drained.
    Closed,
}

/// Outcome of waiting for the queue to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every message handed to the queue was completed.
    Drained,
    TimedOut,
    /// Closed with messages still pending, or pending messages were discarded.
    Closed,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Bytes>,
    in_flight: usize,
    closed: bool,
    discarded: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.items.is_empty() && self.in_flight == 0
    }
}

/// FIFO message queue, optionally bounded.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    drained: Condvar,
    capacity: Option<usize>,
}

impl MessageQueue {
    /// Create a queue; `None` capacity means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            drained: Condvar::new(),
            capacity,
        }
    }

    /// Unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity
            .is_some_and(|capacity| state.items.len() >= capacity)
    }

    /// Append a message at the tail and wake one waiting consumer.
    ///
    /// On a full bounded queue, `Block` waits for room (or close) and
    /// `Reject` fails with `PushError::Full`.
    pub fn push(&self, item: Bytes, policy: BackpressurePolicy) -> Result<(), PushError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed);
        }

        if self.is_full(&state) {
            match policy {
                BackpressurePolicy::Reject => return Err(PushError::Full),
                BackpressurePolicy::Block => {
                    state = self
                        .not_full
                        .wait_while(state, |s| !s.closed && self.is_full(s))
                        .unwrap_or_else(PoisonError::into_inner);
                    if state.closed {
                        return Err(PushError::Closed);
                    }
                }
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head, blocking while the queue is empty.
    ///
    /// Messages queued before `close` are still handed out; `None` once the
    /// queue is closed and empty.
    pub fn pop(&self) -> Option<Bytes> {
        let state = self.lock();
        let mut state = self
            .not_empty
            .wait_while(state, |s| !s.closed && s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let state = self.lock();
        let (mut state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |s| !s.closed && s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        self.pop_locked(&mut state)
    }

    /// Remove the head without blocking.
    pub fn try_pop(&self) -> Pop {
        let mut state = self.lock();
        self.pop_locked(&mut state)
    }

    fn pop_locked(&self, state: &mut QueueState) -> Pop {
        match state.items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Pop::Item(item)
            }
            None if state.closed => Pop::Closed,
            None => Pop::Empty,
        }
    }

    /// Take the head for transmission, blocking while empty.
    ///
    /// Unlike `pop`, returns `None` as soon as the queue is closed: nothing
    /// is written after cancellation. The caller must follow up with
    /// [`complete_io`](Self::complete_io) or [`requeue_front`](Self::requeue_front).
    pub fn take_for_io(&self) -> Option<Bytes> {
        let state = self.lock();
        let mut state = self
            .not_empty
            .wait_while(state, |s| !s.closed && s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        let item = state.items.pop_front()?;
        state.in_flight += 1;
        drop(state);
        self.not_full.notify_one();
        Some(item)
    }

    /// Mark a message from `take_for_io` as written.
    pub fn complete_io(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_drained() {
            self.drained.notify_all();
        }
    }

    /// Return a message from `take_for_io` to the head after a failed write.
    ///
    /// Dropped instead if the queue's contents were already discarded.
    pub fn requeue_front(&self, item: Bytes) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if !state.discarded {
            state.items.push_front(item);
        }
        self.drained.notify_all();
    }

    /// Block until everything pushed so far has been completed.
    pub fn wait_drained(&self, timeout: Option<Duration>) -> Drain {
        let state = self.lock();
        let pending = |s: &mut QueueState| !s.closed && !s.is_drained();
        let state = match timeout {
            Some(timeout) => {
                self.drained
                    .wait_timeout_while(state, timeout, pending)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .drained
                .wait_while(state, pending)
                .unwrap_or_else(PoisonError::into_inner),
        };

        if state.discarded {
            Drain::Closed
        } else if state.is_drained() {
            Drain::Drained
        } else if state.closed {
            Drain::Closed
        } else {
            Drain::TimedOut
        }
    }

    /// Refuse further pushes and wake every waiter.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.drained.notify_all();
    }

    /// Discard all queued messages, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.discarded = true;
        drop(state);
        self.not_full.notify_all();
        self.drained.notify_all();
        dropped
    }

    /// Remove and return every queued message, oldest first.
    pub fn drain_all(&self) -> Vec<Bytes> {
        let mut state = self.lock();
        let items: Vec<Bytes> = state.items.drain(..).collect();
        drop(state);
        self.not_full.notify_all();
        items
    }

    /// Number of queued messages (excluding any being written).
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MessageQueue")
            .field("len", &state.items.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .field("capacity", &self.capacity)
            .finish()
    }
}
