//! Single-threaded mio event loop that owns and drives connecters.
//!
//! The [`Reactor`] plays both roles a connecter needs: it is the poller that
//! reports readiness and fires timers, and it is the owner that creates,
//! terminates and destroys connecters. Everything runs on the thread calling
//! [`Reactor::fetch_events()`]; other threads go through a
//! [`ReactorInterface`].

mod interface;
mod timers;
mod tracker;

pub use interface::ReactorInterface;

use crate::config::{get_namespaced_usize, ConnecterOptions, DEFAULT_POLL_CAPACITY};
use crate::engine::{
    Connecter, EngineContext, Lifecycle, MonitorEvent, OwnedObject, Poller, PollerClient, Session,
    TimerHandle, TimerId, TimerService,
};
use crate::error::Error;
use crate::transport::{Address, ConnectionHandle};
use interface::Command;
use timers::TimerQueue;
use tracker::LiveConnecters;

use ::config::Config;
use mio::event::{Event, Source};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc,
};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

const WAKE_ID: usize = 2;
const CONNECTER_ID_RANGE_START: usize = 1000;

/// Events produced by [`Reactor::fetch_events()`].
#[derive(Debug)]
pub enum ConnecterEvent {
    /// The reactor owns no connecters.
    Inactive,
    /// The connecter finished by handing over a connected socket.
    Connected {
        id: usize,
        connection: ConnectionHandle,
    },
    /// A non-blocking connect is in flight.
    ConnectDelayed { id: usize },
    /// The next attempt is scheduled after `interval`.
    ConnectRetried { id: usize, interval: Duration },
    /// A connecting socket was closed without being handed over.
    Closed { id: usize },
    /// The connecter was terminated on request and destroyed.
    Terminated { id: usize },
}

/// Owner and poller for a set of [`Connecter`]s.
///
/// Not thread-safe. Use [`ReactorInterface`] for cross-thread commands.
///
/// # Configuration Keys
///
/// - `poll_capacity`: events fetched per poll (default 256)
/// - every [`ConnecterOptions`] key
#[derive(Debug)]
pub struct Reactor {
    connecters: HashMap<usize, Connecter>,
    options: Arc<ConnecterOptions>,
    next_id: usize,
    poll: Poll,
    poll_capacity: usize,
    timers: TimerQueue,
    pending: Vec<ConnecterEvent>,
    waker: Arc<Waker>,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
    live: Arc<LiveConnecters>,
}

// ============================================================================
// Constructors
// ============================================================================

impl Reactor {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::new_named(config, "")
    }

    /// Creates a reactor reading `{name}.{key}` before falling back to `{key}`.
    pub fn new_named(config: &Config, name: &str) -> Result<Self, Error> {
        let options = ConnecterOptions::from_config_named(config, name)?;
        let poll_capacity =
            get_namespaced_usize(config, name, "poll_capacity").unwrap_or(DEFAULT_POLL_CAPACITY);
        Self::with_options(options, poll_capacity)
    }

    pub fn with_options(options: ConnecterOptions, poll_capacity: usize) -> Result<Self, Error> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), Token(WAKE_ID))?);
        let (sender, receiver) = channel();

        Ok(Self {
            connecters: HashMap::new(),
            options: Arc::new(options),
            next_id: CONNECTER_ID_RANGE_START,
            poll,
            poll_capacity: poll_capacity.max(1),
            timers: TimerQueue::new(),
            pending: Vec::new(),
            waker,
            sender,
            receiver,
            live: Arc::new(LiveConnecters::default()),
        })
    }
}

// ============================================================================
// Connecter Management
// ============================================================================

impl Reactor {
    /// Creates a connecter for `endpoint` and plugs it in. Returns its ID.
    ///
    /// `endpoint` is `tcp://host:port` or, on Unix, `ipc:///path`. Host names
    /// are resolved on the calling thread and may block on DNS. Use
    /// [`connect_to`](Self::connect_to) with an address parsed elsewhere, or a
    /// [`ReactorInterface`], to keep lookups off the reactor thread.
    #[instrument(skip(self))]
    pub fn connect(&mut self, endpoint: &str) -> Result<usize, Error> {
        Ok(self.start(Address::parse(endpoint)?, false))
    }

    /// Like [`connect`](Self::connect), but the first attempt waits one
    /// reconnect interval.
    #[instrument(skip(self))]
    pub fn reconnect(&mut self, endpoint: &str) -> Result<usize, Error> {
        Ok(self.start(Address::parse(endpoint)?, true))
    }

    /// Creates a connecter for an already resolved address. Never blocks.
    #[instrument(skip(self))]
    pub fn connect_to(&mut self, addr: Address, delayed_start: bool) -> usize {
        self.start(addr, delayed_start)
    }

    /// Terminates and destroys a connecter. Any open socket is closed and no
    /// connection is handed over afterwards.
    #[instrument(skip(self))]
    pub fn terminate(&mut self, id: usize) -> Result<(), Error> {
        match self.dispatch(id, |connecter, ctx| connecter.handle_term(ctx, None)) {
            Some(_) => {
                info!(id, "Terminated connecter");
                self.pending.push(ConnecterEvent::Terminated { id });
                Ok(())
            }
            None => Err(Error::ConnecterNotFound { id }),
        }
    }

    /// Terminates every connecter.
    #[instrument(skip(self))]
    pub fn terminate_all(&mut self) {
        let ids: Vec<usize> = self.connecters.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.terminate(id) {
                warn!(id, ?err, "Failed to terminate connecter");
            }
        }
    }

    pub fn is_live(&self, id: usize) -> bool {
        self.connecters.contains_key(&id)
    }

    pub fn connecter_count(&self) -> usize {
        self.connecters.len()
    }

    fn start(&mut self, addr: Address, delayed_start: bool) -> usize {
        let addr = Arc::new(addr);
        let id = self.next_id;
        self.advance_connecter_id();

        info!(id, %addr, delayed_start, "Starting connecter");
        self.connecters
            .insert(id, Connecter::new(addr, &self.options, delayed_start));
        self.live.insert(id);
        self.dispatch(id, |connecter, ctx| connecter.handle_plug(ctx));
        id
    }

    fn advance_connecter_id(&mut self) {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id < CONNECTER_ID_RANGE_START {
                self.next_id = CONNECTER_ID_RANGE_START;
            }
            if !self.connecters.contains_key(&self.next_id) {
                break;
            }
        }
    }
}

// ============================================================================
// Event Operations
// ============================================================================

impl Reactor {
    /// Blocks until connecter events are available and returns them.
    ///
    /// Returns [`ConnecterEvent::Inactive`] when no connecter is alive.
    #[instrument(skip(self))]
    pub fn fetch_events(&mut self) -> Result<Vec<ConnecterEvent>, Error> {
        while self.pending.is_empty() {
            // Process queued reactor interface commands
            self.process_interface_requests();
            if !self.pending.is_empty() {
                break;
            }

            // Is there anything to do?
            if self.connecters.is_empty() {
                self.pending.push(ConnecterEvent::Inactive);
                break;
            }

            let timeout = self.timers.next_timeout(Instant::now());
            let mut poll_events = Events::with_capacity(self.poll_capacity);
            match self.poll.poll(&mut poll_events, timeout) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(?err, "Poll failed");
                    return Err(Error::PollError(err.to_string()));
                }
            }

            // A queued terminate must reach its connecter before any readiness
            // or timer does.
            self.process_interface_requests();

            for event in poll_events.iter() {
                let Token(id) = event.token();
                if id == WAKE_ID {
                    continue;
                }
                self.process_interface_requests();
                self.dispatch_readiness(id, event);
            }

            for expired in self.timers.pop_expired(Instant::now()) {
                trace!(id = expired.owner, timer = ?expired.id, "Timer fired");
                self.process_interface_requests();
                self.dispatch(expired.owner, |connecter, ctx| {
                    connecter.on_timer(ctx, expired.id)
                });
            }
        }

        debug!(
            count = self.pending.len(),
            timers = self.timers.len(),
            "Fetched events"
        );
        Ok(std::mem::take(&mut self.pending))
    }
}

// ============================================================================
// Utilities
// ============================================================================

impl Reactor {
    /// Gets a thread-safe interface for issuing commands from other threads.
    pub fn get_reactor_interface(&self) -> ReactorInterface {
        ReactorInterface {
            sender: self.sender.clone(),
            waker: self.waker.clone(),
            live: self.live.clone(),
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        // Nothing will ever destroy these connecters now
        self.live.clear();
    }
}

// ============================================================================
// Internal Event Processing
// ============================================================================

impl Reactor {
    fn process_interface_requests(&mut self) {
        let commands: Vec<Command> = self.receiver.try_iter().collect();

        for command in commands {
            match command {
                Command::Connect {
                    addr,
                    delayed_start,
                    response,
                } => {
                    let id = self.start(addr, delayed_start);
                    if let Err(e) = response.send(id) {
                        error!("Failed to send connect response: {:?}", e);
                    }
                }
                Command::Terminate { id } => {
                    if let Err(err) = self.terminate(id) {
                        debug!(id, ?err, "Ignoring terminate request");
                    }
                }
            }
        }
    }

    fn dispatch_readiness(&mut self, id: usize, event: &Event) {
        // Each handler may finish the connecter, so every later one is
        // dispatched only if the previous left it alive.
        if event.is_error() || event.is_read_closed() || event.is_write_closed() {
            if self.dispatch(id, |connecter, ctx| connecter.on_error(ctx))
                != Some(Lifecycle::Active)
            {
                return;
            }
        }
        if event.is_readable()
            && self.dispatch(id, |connecter, ctx| connecter.on_readable(ctx))
                != Some(Lifecycle::Active)
        {
            return;
        }
        if event.is_writable() {
            self.dispatch(id, |connecter, ctx| connecter.on_writable(ctx));
        }
    }

    // Runs one engine call. Events for destroyed connecters are dropped.
    fn dispatch<F>(&mut self, id: usize, call: F) -> Option<Lifecycle>
    where
        F: FnOnce(&mut Connecter, &mut dyn EngineContext) -> Lifecycle,
    {
        let Some(connecter) = self.connecters.get_mut(&id) else {
            trace!(id, "Dropping event for destroyed connecter");
            return None;
        };

        let mut ctx = Dispatch {
            id,
            registry: self.poll.registry(),
            timers: &mut self.timers,
            events: &mut self.pending,
        };
        let lifecycle = call(connecter, &mut ctx);

        if lifecycle == Lifecycle::Finished {
            self.destroy(id);
        }
        Some(lifecycle)
    }

    fn destroy(&mut self, id: usize) {
        self.connecters.remove(&id);
        let stray = self.timers.cancel_owner(id);
        if stray > 0 {
            warn!(id, stray, "Connecter finished with timers still armed");
        }
        self.live.remove(id);
        debug!(id, "Destroyed connecter");
    }
}

// ============================================================================
// Engine Context
// ============================================================================

// What one connecter sees of the reactor during a single call.
struct Dispatch<'a> {
    id: usize,
    registry: &'a Registry,
    timers: &'a mut TimerQueue,
    events: &'a mut Vec<ConnecterEvent>,
}

impl Poller for Dispatch<'_> {
    fn register(&mut self, source: &mut dyn Source, interest: Interest) -> io::Result<()> {
        self.registry.register(source, Token(self.id), interest)
    }

    fn set_interest(&mut self, source: &mut dyn Source, interest: Interest) -> io::Result<()> {
        self.registry.reregister(source, Token(self.id), interest)
    }

    fn deregister(&mut self, source: &mut dyn Source) -> io::Result<()> {
        self.registry.deregister(source)
    }
}

impl TimerService for Dispatch<'_> {
    fn add_timer(&mut self, delay: Duration, id: TimerId) -> TimerHandle {
        self.timers.add(self.id, delay, id)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
    }
}

impl Session for Dispatch<'_> {
    fn attach_session_connection(&mut self, connection: ConnectionHandle) {
        self.events.push(ConnecterEvent::Connected {
            id: self.id,
            connection,
        });
    }

    fn monitor(&mut self, event: MonitorEvent) {
        let id = self.id;
        self.events.push(match event {
            MonitorEvent::ConnectDelayed => ConnecterEvent::ConnectDelayed { id },
            MonitorEvent::ConnectRetried { interval } => {
                ConnecterEvent::ConnectRetried { id, interval }
            }
            MonitorEvent::Closed => ConnecterEvent::Closed { id },
        });
    }
}
