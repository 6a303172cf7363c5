//! Unix domain socket connect.
//!
//! A local connect either completes at once or fails. `EAGAIN` (backlog
//! full) is reported as a failure and retried after backoff, because polling
//! the socket would never complete it.

use super::attempt::{connect_in_progress, prepare_socket};
use super::{ConnectionHandle, OpenOutcome};
use crate::config::ConnecterOptions;

use mio::net::UnixStream;
use socket2::{Domain, SockAddr};
use std::path::Path;

pub(super) fn open(path: &Path, options: &ConnecterOptions) -> OpenOutcome {
    let addr = match SockAddr::unix(path) {
        Ok(addr) => addr,
        Err(err) => return OpenOutcome::Failed(err),
    };
    let socket = match prepare_socket(Domain::UNIX, None, options) {
        Ok(socket) => socket,
        Err(err) => return OpenOutcome::Failed(err),
    };

    let result = socket.connect(&addr);
    let stream = UnixStream::from_std(socket.into());
    match result {
        Ok(()) => OpenOutcome::Connected(ConnectionHandle::Ipc(stream)),
        Err(err) if connect_in_progress(&err) => {
            OpenOutcome::Pending(ConnectionHandle::Ipc(stream))
        }
        Err(err) => OpenOutcome::Failed(err),
    }
}
