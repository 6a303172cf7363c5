use super::tracker::LiveConnecters;
use crate::sync::WaitResult;
use crate::transport::Address;
use crate::Error;

use mio::Waker;
use std::sync::{
    mpsc::{channel, Sender},
    Arc,
};
use std::time::Duration;

// Internal request type for cross-thread communication
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        addr: Address,
        delayed_start: bool,
        response: Sender<usize>,
    },
    Terminate {
        id: usize,
    },
}

/// Thread-safe handle for driving a [`Reactor`](super::Reactor) from other
/// threads.
///
/// Obtain one with
/// [`Reactor::get_reactor_interface()`](super::Reactor::get_reactor_interface).
/// Commands are queued in order and executed by the thread calling
/// [`Reactor::fetch_events()`](super::Reactor::fetch_events).
#[derive(Debug, Clone)]
pub struct ReactorInterface {
    pub(crate) sender: Sender<Command>,
    pub(crate) waker: Arc<Waker>,
    pub(crate) live: Arc<LiveConnecters>,
}

impl ReactorInterface {
    /// Starts connecting to `endpoint` and returns the connecter ID.
    ///
    /// The endpoint is resolved on the calling thread. Blocks until the
    /// reactor thread has created the connecter; the outcome of the
    /// connection itself arrives later as events.
    pub fn connect(&self, endpoint: &str) -> Result<usize, Error> {
        self.start(endpoint, false)
    }

    /// Like [`connect`](Self::connect), but waits one reconnect interval
    /// before the first attempt. Use after a session lost its connection.
    pub fn reconnect(&self, endpoint: &str) -> Result<usize, Error> {
        self.start(endpoint, true)
    }

    /// Queues termination of a connecter without waiting for it.
    pub fn terminate(&self, id: usize) -> Result<(), Error> {
        self.send(Command::Terminate { id })
    }

    /// Queues termination and blocks until the reactor has destroyed the
    /// connecter, or `timeout` elapses. `None` waits forever.
    ///
    /// Returns immediately if `id` is not live, including when it already
    /// handed off its connection.
    pub fn terminate_and_wait(&self, id: usize, timeout: Option<Duration>) -> Result<(), Error> {
        if !self.live.contains(id) {
            return Ok(());
        }
        self.terminate(id)?;
        match self.live.wait_gone(id, timeout) {
            WaitResult::Woken => Ok(()),
            WaitResult::TimedOut => Err(Error::TermTimedOut { id }),
        }
    }

    fn start(&self, endpoint: &str, delayed_start: bool) -> Result<usize, Error> {
        let addr = Address::parse(endpoint)?;
        let (tx, rx) = channel();
        self.send(Command::Connect {
            addr,
            delayed_start,
            response: tx,
        })?;
        rx.recv().map_err(|_| Error::ReactorTerminated)
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        self.sender
            .send(command)
            .map_err(|_| Error::ReactorTerminated)?;
        self.waker.wake()?;
        Ok(())
    }
}
