//! Transport-specific connection establishment.
//!
//! This module turns an [`Address`] into a non-blocking [`ConnectionHandle`]
//! and reports whether the connect succeeded. TCP is always available; Unix
//! domain sockets (`ipc://`) are available on Unix with the `ipc` feature.

mod address;
mod attempt;
mod handle;
#[cfg(all(unix, feature = "ipc"))]
mod ipc;
mod tcp;

pub use address::Address;
pub use attempt::{ConnectOutcome, ConnectionAttempt, OpenOutcome, SocketAttempt};
pub use handle::ConnectionHandle;
