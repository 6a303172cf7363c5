//! # Reconnect backoff.
//!
//! [`ReconnectBackoff`] decides how long a connecter waits before its next
//! connection attempt. It is parameterized by:
//! - `base` the interval used after the first failure and after every reset;
//! - `max` the ceiling for every delay, jitter included. Zero means no
//!   ceiling. When it is not above `base` the interval never grows.
//!
//! The interval doubles after each failed attempt until it reaches `max`.
//! On top of that a jitter offset in `[0, base)` is added so that many peers
//! losing the same server do not come back in lockstep. The offset is drawn
//! once per failure run (on construction and on [`ReconnectBackoff::reset`]),
//! which keeps the returned delays non-decreasing until the next reset.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use rand::{rngs::StdRng, SeedableRng};
//! use rustlink::ReconnectBackoff;
//!
//! let mut backoff = ReconnectBackoff::with_rng(
//!     Duration::from_millis(100),
//!     Duration::from_millis(1600),
//!     StdRng::seed_from_u64(7),
//! );
//!
//! let first = backoff.next_delay();
//! assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(200));
//!
//! let second = backoff.next_delay();
//! assert_eq!(second - first, Duration::from_millis(100));
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::ConnecterOptions;

/// Computes the interval that follows `previous` after another failure.
///
/// Doubles `previous`, clamped to `[base, max]`. When `max <= base` the
/// interval is constant at `base`.
pub fn next_interval(previous: Duration, base: Duration, max: Duration) -> Duration {
    if max <= base {
        return base;
    }
    previous.saturating_mul(2).clamp(base, max)
}

/// Stateful exponential backoff with per-run jitter.
///
/// The random source is injected so tests can pin it with a fixed seed.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff<R = StdRng> {
    base: Duration,
    max: Duration,
    current: Duration,
    jitter: Duration,
    rng: R,
}

impl ReconnectBackoff<StdRng> {
    /// Creates a backoff seeded from the operating system.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self::with_rng(base, max, StdRng::from_os_rng())
    }

    pub fn from_options(options: &ConnecterOptions) -> Self {
        Self::new(options.reconnect_ivl, options.reconnect_ivl_max)
    }
}

impl<R: Rng> ReconnectBackoff<R> {
    pub fn with_rng(base: Duration, max: Duration, mut rng: R) -> Self {
        let jitter = draw_jitter(&mut rng, base);
        Self {
            base,
            max,
            current: base,
            jitter,
            rng,
        }
    }

    /// Returns the delay to wait now and advances the interval for the next
    /// failure.
    pub fn next_delay(&mut self) -> Duration {
        let mut delay = self.current.saturating_add(self.jitter);
        if let Some(ceiling) = self.ceiling() {
            delay = delay.min(ceiling);
        }
        self.current = next_interval(self.current, self.base, self.max);
        delay
    }

    /// Starts a new failure run from `base`.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.jitter = draw_jitter(&mut self.rng, self.base);
    }

    /// The interval (without jitter) the next delay is derived from.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    // A zero max means no ceiling at all, so jitter applies on top of base.
    fn ceiling(&self) -> Option<Duration> {
        (!self.max.is_zero()).then(|| self.max.max(self.base))
    }
}

fn draw_jitter<R: Rng>(rng: &mut R, base: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    if base_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..base_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn seeded(base: u64, max: u64, seed: u64) -> ReconnectBackoff {
        ReconnectBackoff::with_rng(ms(base), ms(max), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_next_interval_doubles() {
        assert_eq!(next_interval(ms(100), ms(100), ms(1600)), ms(200));
        assert_eq!(next_interval(ms(200), ms(100), ms(1600)), ms(400));
        assert_eq!(next_interval(ms(800), ms(100), ms(1600)), ms(1600));
    }

    #[test]
    fn test_next_interval_clamped() {
        assert_eq!(next_interval(ms(1600), ms(100), ms(1600)), ms(1600));
        assert_eq!(next_interval(ms(1000), ms(100), ms(1600)), ms(1600));
        assert_eq!(next_interval(ms(10), ms(100), ms(1600)), ms(100));
        assert_eq!(
            next_interval(Duration::MAX, ms(100), ms(1600)),
            ms(1600)
        );
    }

    #[test]
    fn test_next_interval_without_ceiling_is_constant() {
        assert_eq!(next_interval(ms(100), ms(100), Duration::ZERO), ms(100));
        assert_eq!(next_interval(ms(400), ms(100), ms(100)), ms(100));
    }

    #[test]
    fn test_first_delay_is_base_plus_jitter() {
        for seed in 0..50 {
            let delay = seeded(100, 1600, seed).next_delay();
            assert!(delay >= ms(100), "seed {seed}: {delay:?} below base");
            assert!(delay < ms(200), "seed {seed}: {delay:?} beyond jitter bound");
        }
    }

    #[test]
    fn test_doubling_until_ceiling() {
        let mut backoff = seeded(100, 1600, 3);
        let first = backoff.next_delay();
        let jitter = first - ms(100);

        assert_eq!(backoff.next_delay(), ms(200) + jitter);
        assert_eq!(backoff.next_delay(), ms(400) + jitter);
        assert_eq!(backoff.next_delay(), ms(800) + jitter);
        assert_eq!(backoff.next_delay(), ms(1600));
        assert_eq!(backoff.next_delay(), ms(1600));
    }

    #[test]
    fn test_monotonic_and_bounded() {
        for seed in 0..20 {
            let mut backoff = seeded(100, 1600, seed);
            let mut previous = Duration::ZERO;
            for attempt in 0..40 {
                let delay = backoff.next_delay();
                assert!(
                    delay >= previous,
                    "seed {seed} attempt {attempt}: {delay:?} < {previous:?}"
                );
                assert!(delay <= ms(1600), "seed {seed} attempt {attempt}: {delay:?}");
                previous = delay;
            }
        }
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = seeded(100, 1600, 11);
        for _ in 0..6 {
            backoff.next_delay();
        }
        assert_eq!(backoff.current(), ms(1600));

        backoff.reset();
        assert_eq!(backoff.current(), ms(100));
        let delay = backoff.next_delay();
        assert!(delay >= ms(100) && delay < ms(200), "{delay:?}");
    }

    #[test]
    fn test_constant_without_ceiling() {
        let mut backoff = seeded(250, 0, 5);
        let first = backoff.next_delay();
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), first);
        }
        assert_eq!(backoff.current(), ms(250));
    }

    #[test]
    fn test_ceiling_equal_to_base_caps_jitter() {
        for seed in 0..20 {
            let mut backoff = seeded(100, 100, seed);
            assert_eq!(backoff.next_delay(), ms(100));
            assert_eq!(backoff.next_delay(), ms(100));
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = seeded(100, 10_000, 42);
        let mut b = seeded(100, 10_000, 42);
        for _ in 0..10 {
            assert_eq!(a.next_delay(), b.next_delay());
        }
    }

    #[test]
    fn test_zero_base_has_no_jitter() {
        let mut backoff = seeded(0, 0, 1);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
    }
}
