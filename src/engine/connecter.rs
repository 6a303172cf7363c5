//! Per-endpoint connection state machine.
//!
//! ```text
//! idle ──plug──▶ waiting (delayed start) ──reconnect timer──▶ connecting
//!   │                  ▲                                        │   │
//!   └──plug────────────┼──────────────▶ connecting              │   │
//!                      └──── failure / connect timer ◀──────────┘   │
//!                                                       success ────┴─▶ handoff
//! term is accepted in every state and finishes the connecter.
//! ```

use super::{
    EngineContext, Lifecycle, MonitorEvent, OwnedObject, PollerClient, TimerHandle, TimerId,
};
use crate::config::ConnecterOptions;
use crate::policies::ReconnectBackoff;
use crate::transport::{
    Address, ConnectOutcome, ConnectionAttempt, ConnectionHandle, OpenOutcome, SocketAttempt,
};

use mio::Interest;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    // Reconnect timer armed, no handle open.
    Waiting,
    // Handle open and registered, connect timer armed if configured.
    Connecting,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    id: TimerId,
    handle: TimerHandle,
}

/// Establishes one connection to one address, retrying with backoff until it
/// can hand a connected handle to the session or is terminated.
///
/// At most one handle is open and at most one timer is armed at any time.
/// The address is shared read-only with the owner, which must outlive the
/// connecter.
#[derive(Debug)]
pub struct Connecter<A = SocketAttempt, R = StdRng> {
    addr: Arc<Address>,
    attempt: A,
    backoff: ReconnectBackoff<R>,
    connect_timeout: Option<Duration>,
    delayed_start: bool,
    handle: Option<ConnectionHandle>,
    registered: bool,
    timer: Option<ArmedTimer>,
    state: State,
}

impl Connecter {
    /// Creates a socket connecter. With `delayed_start` the first attempt
    /// waits one reconnect interval, which staggers reconnects after a
    /// connection loss.
    pub fn new(addr: Arc<Address>, options: &Arc<ConnecterOptions>, delayed_start: bool) -> Self {
        Self::with_parts(
            addr,
            SocketAttempt::new(options.clone()),
            ReconnectBackoff::from_options(options),
            options.connect_timeout,
            delayed_start,
        )
    }
}

impl<A: ConnectionAttempt, R: Rng> Connecter<A, R> {
    pub fn with_parts(
        addr: Arc<Address>,
        attempt: A,
        backoff: ReconnectBackoff<R>,
        connect_timeout: Option<Duration>,
        delayed_start: bool,
    ) -> Self {
        Self {
            addr,
            attempt,
            backoff,
            connect_timeout,
            delayed_start,
            handle: None,
            registered: false,
            timer: None,
            state: State::Idle,
        }
    }

    pub fn address(&self) -> &Address {
        &self.addr
    }

    /// Which timer is armed, if any.
    pub fn armed_timer(&self) -> Option<TimerId> {
        self.timer.map(|timer| timer.id)
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Interval the next reconnect delay is derived from.
    pub fn current_interval(&self) -> Duration {
        self.backoff.current()
    }

    fn start_connecting(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        assert!(
            self.handle.is_none(),
            "Connecter for {} opened a second handle",
            self.addr
        );

        match self.attempt.open(&self.addr) {
            OpenOutcome::Connected(handle) => {
                debug!(addr = %self.addr, "Connect completed immediately");
                self.handle = Some(handle);
                self.hand_off(ctx)
            }
            OpenOutcome::Pending(mut handle) => {
                if let Err(err) = ctx.register(&mut handle, Interest::WRITABLE) {
                    warn!(addr = %self.addr, ?err, "Failed to register connecting socket");
                    self.handle = Some(handle);
                    return self.retry(ctx);
                }
                self.handle = Some(handle);
                self.registered = true;
                self.state = State::Connecting;
                trace!(addr = %self.addr, "Connect in progress");
                ctx.monitor(MonitorEvent::ConnectDelayed);
                self.add_connect_timer(ctx);
                Lifecycle::Active
            }
            OpenOutcome::Failed(err) => {
                debug!(addr = %self.addr, ?err, "Connect failed");
                self.retry(ctx)
            }
        }
    }

    // Common completion check for readable, writable and error events.
    fn connect_event(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        if self.state != State::Connecting {
            trace!(addr = %self.addr, state = ?self.state, "Ignoring stale readiness event");
            return self.lifecycle();
        }
        let Some(handle) = self.handle.as_ref() else {
            return self.lifecycle();
        };

        match self.attempt.poll_outcome(handle) {
            ConnectOutcome::StillPending => {
                trace!(addr = %self.addr, "Spurious readiness, connect still pending");
                Lifecycle::Active
            }
            ConnectOutcome::Failure(err) => {
                info!(addr = %self.addr, ?err, "Connection attempt failed");
                self.retry(ctx)
            }
            ConnectOutcome::Success => {
                self.cancel_timer(ctx);
                self.deregister(ctx);
                self.hand_off(ctx)
            }
        }
    }

    fn hand_off(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        let tuned = match self.handle.as_ref() {
            Some(handle) => self.attempt.tune(handle),
            None => false,
        };
        if !tuned {
            return self.retry(ctx);
        }
        let Some(handle) = self.handle.take() else {
            return self.retry(ctx);
        };

        info!(addr = %self.addr, peer = %handle.peer(), "Connection established");
        self.backoff.reset();
        self.state = State::Finished;
        ctx.attach_session_connection(handle);
        Lifecycle::Finished
    }

    // Closes whatever is open and schedules the next attempt.
    fn retry(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        self.cancel_timer(ctx);
        self.deregister(ctx);
        self.close(ctx);
        self.add_reconnect_timer(ctx);
        Lifecycle::Active
    }

    fn add_reconnect_timer(&mut self, ctx: &mut dyn EngineContext) {
        let interval = self.backoff.next_delay();
        self.arm(ctx, interval, TimerId::Reconnect);
        self.state = State::Waiting;
        debug!(
            addr = %self.addr,
            interval_ms = interval.as_millis() as u64,
            "Scheduled reconnect"
        );
        ctx.monitor(MonitorEvent::ConnectRetried { interval });
    }

    fn add_connect_timer(&mut self, ctx: &mut dyn EngineContext) {
        if let Some(timeout) = self.connect_timeout {
            self.arm(ctx, timeout, TimerId::Connect);
        }
    }

    fn arm(&mut self, ctx: &mut dyn EngineContext, delay: Duration, id: TimerId) {
        assert!(
            self.timer.is_none(),
            "Connecter for {} armed {id:?} while another timer was armed",
            self.addr
        );
        let handle = ctx.add_timer(delay, id);
        self.timer = Some(ArmedTimer { id, handle });
    }

    fn cancel_timer(&mut self, ctx: &mut dyn EngineContext) {
        if let Some(timer) = self.timer.take() {
            ctx.cancel_timer(timer.handle);
        }
    }

    fn deregister(&mut self, ctx: &mut dyn EngineContext) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = ctx.deregister(handle) {
                warn!(addr = %self.addr, ?err, "Failed to deregister connecting socket");
            }
        }
    }

    fn close(&mut self, ctx: &mut dyn EngineContext) {
        if self.attempt.close(&mut self.handle) {
            ctx.monitor(MonitorEvent::Closed);
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.state == State::Finished {
            Lifecycle::Finished
        } else {
            Lifecycle::Active
        }
    }
}

impl<A: ConnectionAttempt, R: Rng> OwnedObject for Connecter<A, R> {
    #[instrument(skip(self, ctx), fields(addr = %self.addr))]
    fn handle_plug(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        if self.state != State::Idle {
            warn!(state = ?self.state, "Connecter plugged twice");
            return self.lifecycle();
        }
        if self.delayed_start {
            self.add_reconnect_timer(ctx);
            Lifecycle::Active
        } else {
            self.start_connecting(ctx)
        }
    }

    #[instrument(skip(self, ctx), fields(addr = %self.addr))]
    fn handle_term(&mut self, ctx: &mut dyn EngineContext, linger: Option<Duration>) -> Lifecycle {
        self.cancel_timer(ctx);
        self.deregister(ctx);
        self.close(ctx);
        if self.state != State::Finished {
            debug!(state = ?self.state, "Connecter terminated");
        }
        self.state = State::Finished;
        Lifecycle::Finished
    }
}

impl<A: ConnectionAttempt, R: Rng> PollerClient for Connecter<A, R> {
    fn on_readable(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        // A connected socket may be readable before it is writable.
        self.connect_event(ctx)
    }

    fn on_writable(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        self.connect_event(ctx)
    }

    fn on_error(&mut self, ctx: &mut dyn EngineContext) -> Lifecycle {
        self.connect_event(ctx)
    }

    fn on_timer(&mut self, ctx: &mut dyn EngineContext, id: TimerId) -> Lifecycle {
        match self.timer {
            Some(armed) if armed.id == id => self.timer = None,
            _ => {
                trace!(addr = %self.addr, ?id, "Ignoring stale timer");
                return self.lifecycle();
            }
        }

        match id {
            TimerId::Connect => {
                info!(addr = %self.addr, "Connect timed out");
                self.retry(ctx)
            }
            TimerId::Reconnect => self.start_connecting(ctx),
        }
    }
}
