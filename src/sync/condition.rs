//! Portable blocking wait with timeout and broadcast.
//!
//! [`Condition`] is a monitor-style condition variable: a caller holding a
//! [`MutexGuard`] hands it to [`Condition::wait`], which releases the mutex,
//! blocks, and re-acquires the mutex before returning. [`Condition::broadcast`]
//! wakes every blocked waiter.
//!
//! The platform backend (futex, SRW lock, or pthread condition variable) is
//! selected by the standard library at build time. All of them measure
//! timeouts against a monotonic clock, so wall-clock adjustments neither
//! shorten nor extend a wait.
//!
//! There is no predicate here. Waits may end spuriously with
//! [`WaitResult::Woken`], so callers re-check their own state in a loop:
//!
//! ```rust
//! use rustlink::{Condition, WaitResult};
//! use std::sync::Mutex;
//! use std::time::{Duration, Instant};
//!
//! let done = Mutex::new(false);
//! let condition = Condition::new();
//!
//! let deadline = Instant::now() + Duration::from_millis(20);
//! let mut guard = done.lock().unwrap();
//! while !*guard {
//!     let remaining = deadline.saturating_duration_since(Instant::now());
//!     let (next, result) = condition.wait(guard, Some(remaining));
//!     guard = next;
//!     if result == WaitResult::TimedOut {
//!         break;
//!     }
//! }
//! assert!(!*guard);
//! ```

use std::sync::{Condvar, MutexGuard};
use std::time::Duration;

/// How a [`Condition::wait`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by a broadcast, or spuriously. Re-check the predicate.
    Woken,
    /// The timeout elapsed.
    TimedOut,
}

/// Condition variable bound to one caller-owned mutex.
///
/// A `Condition` must always be used with the same mutex, must outlive every
/// thread blocked on it, and is neither `Clone` nor `Copy`.
/// Share it by reference or inside an `Arc` together with its mutex.
#[derive(Debug, Default)]
pub struct Condition {
    cv: Condvar,
}

impl Condition {
    pub fn new() -> Self {
        Self { cv: Condvar::new() }
    }

    /// Releases `guard`'s mutex, blocks until broadcast or timeout, and
    /// re-acquires the mutex.
    ///
    /// `None` waits indefinitely. Releasing the mutex and joining the set of
    /// waiters happen atomically, so a [`broadcast`](Self::broadcast) issued by
    /// a thread that changed the protected state under the same mutex cannot
    /// be missed.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned. A thread died while holding the
    /// protected state, and nothing guarded by it can be trusted afterwards.
    pub fn wait<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Option<Duration>,
    ) -> (MutexGuard<'a, T>, WaitResult) {
        match timeout {
            None => {
                let guard = self
                    .cv
                    .wait(guard)
                    .expect("Condition mutex poisoned while waiting");
                (guard, WaitResult::Woken)
            }
            Some(timeout) => {
                let (guard, status) = self
                    .cv
                    .wait_timeout(guard, timeout)
                    .expect("Condition mutex poisoned while waiting");
                if status.timed_out() {
                    (guard, WaitResult::TimedOut)
                } else {
                    (guard, WaitResult::Woken)
                }
            }
        }
    }

    /// Same as [`wait`](Self::wait) with a millisecond timeout, where any
    /// negative value (conventionally `-1`) means wait forever.
    pub fn wait_ms<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout_ms: i64,
    ) -> (MutexGuard<'a, T>, WaitResult) {
        let timeout = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
        self.wait(guard, timeout)
    }

    /// Wakes all threads currently blocked in [`wait`](Self::wait).
    pub fn broadcast(&self) {
        self.cv.notify_all();
    }
}
