use mio::event::Source;
use mio::net::TcpStream;
#[cfg(all(unix, feature = "ipc"))]
use mio::net::UnixStream;
use mio::{Interest, Registry, Token};
use std::io;

/// A non-blocking stream owned by exactly one party at a time.
///
/// A connecter owns its handle from `open` until it either closes it or hands
/// it to the session. "No handle" is always `None` in an
/// `Option<ConnectionHandle>`, never a special descriptor value.
#[derive(Debug)]
pub enum ConnectionHandle {
    Tcp(TcpStream),
    #[cfg(all(unix, feature = "ipc"))]
    Ipc(UnixStream),
}

impl ConnectionHandle {
    /// Reads and clears the pending socket error (`SO_ERROR`).
    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            ConnectionHandle::Tcp(stream) => stream.take_error(),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => stream.take_error(),
        }
    }

    // `NotConnected` while the handshake is still in flight.
    pub(crate) fn check_connected(&self) -> io::Result<()> {
        match self {
            ConnectionHandle::Tcp(stream) => stream.peer_addr().map(|_| ()),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => stream.peer_addr().map(|_| ()),
        }
    }

    /// Peer description for log fields.
    pub fn peer(&self) -> String {
        match self {
            ConnectionHandle::Tcp(stream) => match stream.peer_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => "<unconnected>".to_string(),
            },
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => match stream.peer_addr() {
                Ok(addr) => format!("{addr:?}"),
                Err(_) => "<unconnected>".to_string(),
            },
        }
    }

    pub fn into_tcp(self) -> Option<TcpStream> {
        match self {
            ConnectionHandle::Tcp(stream) => Some(stream),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(_) => None,
        }
    }

    #[cfg(all(unix, feature = "ipc"))]
    pub fn into_ipc(self) -> Option<UnixStream> {
        match self {
            ConnectionHandle::Ipc(stream) => Some(stream),
            ConnectionHandle::Tcp(_) => None,
        }
    }
}

impl Source for ConnectionHandle {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            ConnectionHandle::Tcp(stream) => stream.register(registry, token, interests),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => stream.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            ConnectionHandle::Tcp(stream) => stream.reregister(registry, token, interests),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => stream.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            ConnectionHandle::Tcp(stream) => stream.deregister(registry),
            #[cfg(all(unix, feature = "ipc"))]
            ConnectionHandle::Ipc(stream) => stream.deregister(registry),
        }
    }
}
