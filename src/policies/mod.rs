//! Retry policies used by connecters.

pub mod backoff;

pub use backoff::{next_interval, ReconnectBackoff};
