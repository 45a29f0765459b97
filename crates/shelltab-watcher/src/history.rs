//! Closed-window history.
//!
//! Recently closed windows, most recent on top, plus the time of the last
//! close. A window that reappears at the location of a record pushed moments
//! ago is a tab being dragged out of its window, not a new window.

use shelltab_core::WindowRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Default)]
struct HistoryState {
    /// Front is the most recent record.
    records: VecDeque<WindowRecord>,
    last_closed_at: Option<Instant>,
}

pub struct ClosedWindowHistory {
    state: Mutex<HistoryState>,
    staleness: Duration,
    capacity: usize,
}

impl ClosedWindowHistory {
    pub fn new(staleness: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState::default()),
            staleness,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a closing window. The oldest record is evicted when full.
    pub fn push(&self, record: WindowRecord) {
        let mut state = self.lock();
        trace!(location = %record.location, "Recording closed window");
        state.records.push_front(record);
        state.records.truncate(self.capacity);
        state.last_closed_at = Some(Instant::now());
    }

    /// Put back a record taken with [`ClosedWindowHistory::pop_most_recent`].
    /// Unlike [`ClosedWindowHistory::push`] this is not a new close, so it never
    /// makes the record match a reappearing window.
    pub fn restore(&self, record: WindowRecord) {
        let mut state = self.lock();
        trace!(location = %record.location, "Restoring closed window");
        state.records.push_front(record);
        state.records.truncate(self.capacity);
    }

    pub fn pop_most_recent(&self) -> Option<WindowRecord> {
        self.lock().records.pop_front()
    }

    /// Consume the most recent record if it was pushed within the staleness
    /// window and its location equals `location`. Otherwise the history is left
    /// untouched.
    pub fn try_match_and_consume(&self, location: &str) -> Option<WindowRecord> {
        let mut state = self.lock();
        let fresh = state
            .last_closed_at
            .is_some_and(|at| at.elapsed() <= self.staleness);
        if !fresh {
            return None;
        }
        if state.records.front()?.location != location {
            return None;
        }
        state.records.pop_front()
    }

    pub fn peek(&self) -> Option<WindowRecord> {
        self.lock().records.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.last_closed_at = None;
    }
}
