//! Cross-thread view of which connecters the reactor still owns.

use crate::sync::{Condition, WaitResult};

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Connecter ids that have been created and not yet destroyed.
///
/// The reactor inserts and removes ids; other threads block in
/// [`wait_gone`](Self::wait_gone) until an id disappears.
#[derive(Debug, Default)]
pub(crate) struct LiveConnecters {
    ids: Mutex<HashSet<usize>>,
    changed: Condition,
}

impl LiveConnecters {
    pub fn insert(&self, id: usize) {
        self.lock().insert(id);
    }

    pub fn remove(&self, id: usize) {
        let mut ids = self.lock();
        if ids.remove(&id) {
            self.changed.broadcast();
        }
    }

    pub fn clear(&self) {
        let mut ids = self.lock();
        if !ids.is_empty() {
            ids.clear();
            self.changed.broadcast();
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.lock().contains(&id)
    }

    /// Blocks until `id` is not live. `None` waits forever.
    pub fn wait_gone(&self, id: usize, timeout: Option<Duration>) -> WaitResult {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut ids = self.lock();
        while ids.contains(&id) {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitResult::TimedOut;
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            ids = self.changed.wait(ids, remaining).0;
        }
        WaitResult::Woken
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<usize>> {
        self.ids.lock().expect("live connecter set poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unknown_id_is_already_gone() {
        let live = LiveConnecters::default();
        assert_eq!(live.wait_gone(3, Some(Duration::ZERO)), WaitResult::Woken);
    }

    #[test]
    fn wait_times_out_while_live() {
        let live = LiveConnecters::default();
        live.insert(3);
        let start = Instant::now();
        assert_eq!(
            live.wait_gone(3, Some(Duration::from_millis(30))),
            WaitResult::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(live.contains(3));
    }

    #[test]
    fn removal_wakes_waiter() {
        let live = Arc::new(LiveConnecters::default());
        live.insert(5);
        live.insert(6);

        let waiter = {
            let live = live.clone();
            thread::spawn(move || live.wait_gone(5, Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        live.remove(6);
        live.remove(5);

        assert_eq!(waiter.join().unwrap(), WaitResult::Woken);
    }

    #[test]
    fn clear_releases_everyone() {
        let live = Arc::new(LiveConnecters::default());
        live.insert(1);
        live.insert(2);

        let waiters: Vec<_> = [1, 2]
            .into_iter()
            .map(|id| {
                let live = live.clone();
                thread::spawn(move || live.wait_gone(id, None))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        live.clear();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), WaitResult::Woken);
        }
    }
}
