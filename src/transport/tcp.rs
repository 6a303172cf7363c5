//! TCP connect and tuning.

use super::attempt::{connect_in_progress, prepare_socket};
use super::{ConnectionHandle, OpenOutcome};
use crate::config::ConnecterOptions;

use mio::net::TcpStream;
use socket2::{Domain, Protocol, SockAddr, SockRef, TcpKeepalive};
use std::io;
use std::net::SocketAddr;
use tracing::trace;

pub(super) fn open(addr: SocketAddr, options: &ConnecterOptions) -> OpenOutcome {
    let socket = match prepare_socket(Domain::for_address(addr), Some(Protocol::TCP), options) {
        Ok(socket) => socket,
        Err(err) => return OpenOutcome::Failed(err),
    };

    let result = socket.connect(&SockAddr::from(addr));
    let stream = TcpStream::from_std(socket.into());
    match result {
        Ok(()) => {
            trace!(%addr, "TCP connect completed immediately");
            OpenOutcome::Connected(ConnectionHandle::Tcp(stream))
        }
        Err(err) if connect_in_progress(&err) => {
            OpenOutcome::Pending(ConnectionHandle::Tcp(stream))
        }
        Err(err) => OpenOutcome::Failed(err),
    }
}

pub(super) fn tune(stream: &TcpStream, options: &ConnecterOptions) -> io::Result<()> {
    stream.set_nodelay(options.tcp_nodelay)?;

    let socket = SockRef::from(stream);
    match options.tcp_keepalive {
        Some(true) => {
            let mut keepalive = TcpKeepalive::new();
            if let Some(idle) = options.tcp_keepalive_idle {
                keepalive = keepalive.with_time(idle);
            }
            #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
            if let Some(interval) = options.tcp_keepalive_intvl {
                keepalive = keepalive.with_interval(interval);
            }
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            if let Some(count) = options.tcp_keepalive_cnt {
                keepalive = keepalive.with_retries(count);
            }
            socket.set_tcp_keepalive(&keepalive)?;
        }
        Some(false) => socket.set_keepalive(false)?,
        None => {}
    }
    Ok(())
}
