//! Connection lifecycle engine and the interfaces it is driven through.
//!
//! A [`Connecter`] never owns the reactor, the timers or the session. Every
//! handler receives an [`EngineContext`] for the duration of the call and
//! returns a [`Lifecycle`] telling its owner whether to keep it alive. The
//! owner dispatches commands ([`OwnedObject`]) and readiness or timer events
//! ([`PollerClient`]) on a single reactor thread.

mod connecter;

pub use connecter::Connecter;

use crate::transport::ConnectionHandle;
use mio::event::Source;
use mio::Interest;
use std::io;
use std::time::Duration;

/// Identifies which of a connecter's two timers fired.
///
/// Scoped to one connecter; different connecters may have both armed at the
/// same time without any numbering conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Delay before the next connection attempt.
    Reconnect,
    /// Bound on an in-progress connect.
    Connect,
}

/// Opaque handle to one armed timer, unique for the owner's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub(crate) u64);

/// Whether an engine should stay alive after handling a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// The engine has released everything it held. Drop it.
    Finished,
}

/// Connection progress reported to the session for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A connect is in flight.
    ConnectDelayed,
    /// The next attempt is scheduled after `interval`.
    ConnectRetried { interval: Duration },
    /// The connecting socket was closed without being handed off.
    Closed,
}

/// Readiness registration on the reactor thread.
///
/// Deregistration is synchronous: once `deregister` returns, the engine sees
/// no further events for that source.
pub trait Poller {
    fn register(&mut self, source: &mut dyn Source, interest: Interest) -> io::Result<()>;
    fn set_interest(&mut self, source: &mut dyn Source, interest: Interest) -> io::Result<()>;
    fn deregister(&mut self, source: &mut dyn Source) -> io::Result<()>;
}

/// One-shot timers delivered back through [`PollerClient::on_timer`].
pub trait TimerService {
    fn add_timer(&mut self, delay: Duration, id: TimerId) -> TimerHandle;
    /// Cancelling a timer that already fired or was cancelled is a no-op.
    fn cancel_timer(&mut self, handle: TimerHandle);
}

/// The owner-side session a connecter works for.
pub trait Session {
    /// Hands a connected, tuned handle over. Ownership moves to the session.
    fn attach_session_connection(&mut self, handle: ConnectionHandle);

    fn monitor(&mut self, event: MonitorEvent) {
        let _ = event;
    }
}

/// Everything a connecter may touch while handling a call.
pub trait EngineContext: Poller + TimerService + Session {}

impl<T: Poller + TimerService + Session> EngineContext for T {}

/// Commands delivered in order by the owner.
pub trait OwnedObject {
    fn handle_plug(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle;

    /// Always accepted and always the last command processed. `linger` is
    /// meaningless for an object that holds no outgoing data.
    fn handle_term(&mut self, ctx: &mut dyn EngineContext, linger: Option<Duration>) -> Lifecycle;
}

/// Reactor callbacks.
pub trait PollerClient {
    fn on_readable(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle;
    fn on_writable(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle;
    fn on_error(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle;
    fn on_timer(&mut self, ctx: &mut dyn EngineContext, id: TimerId) -> Lifecycle;
}
