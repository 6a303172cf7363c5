//! Monotonic one-shot timer queue.

use crate::engine::{TimerHandle, TimerId};

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Expired {
    pub owner: usize,
    pub id: TimerId,
}

/// Timers ordered by deadline, ties broken by arming order.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    next_handle: u64,
    deadlines: BTreeMap<(Instant, TimerHandle), Expired>,
    index: HashMap<TimerHandle, Instant>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, owner: usize, delay: Duration, id: TimerId) -> TimerHandle {
        self.add_at(Instant::now() + delay, owner, id)
    }

    fn add_at(&mut self, deadline: Instant, owner: usize, id: TimerId) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.deadlines.insert((deadline, handle), Expired { owner, id });
        self.index.insert(handle, deadline);
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.index.remove(&handle) {
            Some(deadline) => self.deadlines.remove(&(deadline, handle)).is_some(),
            None => false,
        }
    }

    /// Drops every timer armed by `owner`.
    pub fn cancel_owner(&mut self, owner: usize) -> usize {
        let handles: Vec<TimerHandle> = self
            .deadlines
            .iter()
            .filter(|(_, expired)| expired.owner == owner)
            .map(|((_, handle), _)| *handle)
            .collect();
        for handle in &handles {
            self.cancel(*handle);
        }
        handles.len()
    }

    /// Time until the earliest deadline, zero if it already passed.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadlines
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();
        while let Some(entry) = self.deadlines.first_entry() {
            let (deadline, handle) = *entry.key();
            if deadline > now {
                break;
            }
            expired.push(entry.remove());
            self.index.remove(&handle);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}
