use super::{tcp, Address, ConnectionHandle};
#[cfg(all(unix, feature = "ipc"))]
use super::ipc;
use crate::config::ConnecterOptions;

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of issuing a non-blocking connect.
#[derive(Debug)]
pub enum OpenOutcome {
    /// The connect completed synchronously.
    Connected(ConnectionHandle),
    /// The connect is in flight. Completion shows up as writability or an
    /// error on the handle.
    Pending(ConnectionHandle),
    /// No connection was started. Any descriptor created has been closed.
    Failed(io::Error),
}

/// Result of inspecting a handle after the poller reported it ready.
#[derive(Debug)]
pub enum ConnectOutcome {
    Success,
    Failure(io::Error),
    StillPending,
}

/// Opens one connection to a resolved address and reads back its outcome.
///
/// Implementations never block. Every failure they report is transient from
/// the connecter's point of view and leads to another attempt after backoff.
pub trait ConnectionAttempt {
    fn open(&mut self, addr: &Address) -> OpenOutcome;

    /// Call only after the poller reported the handle writable, readable or
    /// errored. Decides on the socket error state, not on readiness alone.
    fn poll_outcome(&mut self, handle: &ConnectionHandle) -> ConnectOutcome;

    /// Applies post-connect socket options. `false` means the handle is not
    /// usable and must be closed like a failed connect.
    fn tune(&mut self, handle: &ConnectionHandle) -> bool;

    /// Closes the handle in `slot`, if any. Returns whether one was closed.
    fn close(&mut self, slot: &mut Option<ConnectionHandle>) -> bool {
        slot.take().is_some()
    }
}

/// [`ConnectionAttempt`] over real TCP and Unix domain sockets.
#[derive(Debug, Clone)]
pub struct SocketAttempt {
    options: Arc<ConnecterOptions>,
}

impl SocketAttempt {
    pub fn new(options: Arc<ConnecterOptions>) -> Self {
        Self { options }
    }
}

impl ConnectionAttempt for SocketAttempt {
    fn open(&mut self, addr: &Address) -> OpenOutcome {
        match addr {
            Address::Tcp(addr) => tcp::open(*addr, &self.options),
            #[cfg(all(unix, feature = "ipc"))]
            Address::Ipc(path) => ipc::open(path, &self.options),
        }
    }

    fn poll_outcome(&mut self, handle: &ConnectionHandle) -> ConnectOutcome {
        match handle.take_error() {
            Ok(Some(err)) | Err(err) => return ConnectOutcome::Failure(err),
            Ok(None) => {}
        }
        match handle.check_connected() {
            Ok(()) => ConnectOutcome::Success,
            Err(err) if err.kind() == ErrorKind::NotConnected => ConnectOutcome::StillPending,
            Err(err) => ConnectOutcome::Failure(err),
        }
    }

    fn tune(&mut self, handle: &ConnectionHandle) -> bool {
        let result = match handle {
            ConnectionHandle::Tcp(stream) => tcp::tune(stream, &self.options),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(_) => Ok(()),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, peer = %handle.peer(), "Failed to tune connected socket");
                false
            }
        }
    }

    fn close(&mut self, slot: &mut Option<ConnectionHandle>) -> bool {
        match slot.take() {
            Some(handle) => {
                debug!(peer = %handle.peer(), "Closing connecting socket");
                true
            }
            None => false,
        }
    }
}

// Creates a non-blocking stream socket with the pre-connect options applied.
// Buffer sizes must be set before connecting to influence window scaling.
pub(super) fn prepare_socket(
    domain: Domain,
    protocol: Option<Protocol>,
    options: &ConnecterOptions,
) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::STREAM, protocol)?;
    socket.set_nonblocking(true)?;
    if let Some(size) = options.sndbuf {
        socket.set_send_buffer_size(size)?;
    }
    if let Some(size) = options.rcvbuf {
        socket.set_recv_buffer_size(size)?;
    }
    Ok(socket)
}

// Whether a non-blocking connect error means "launched asynchronously".
pub(super) fn connect_in_progress(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(libc::EINPROGRESS) | Some(libc::EINTR))
    }
    #[cfg(not(unix))]
    {
        err.kind() == ErrorKind::WouldBlock
    }
}
