//! RustLink - resilient outbound connection establishment over mio
//!
//! RustLink opens non-blocking TCP and Unix domain socket connections and
//! keeps retrying them with jittered exponential backoff until they succeed
//! or are terminated. A [`Connecter`] is a small state machine driven by an
//! owner through capability traits; [`Reactor`] is a ready-made mio event
//! loop that owns connecters and reports [`ConnecterEvent`]s. [`Condition`]
//! is the wait/broadcast primitive owners use to block on engine shutdown.

// Internal-only modules
pub(crate) mod config;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod policies;
pub(crate) mod reactor;
pub(crate) mod sync;
pub(crate) mod transport;

// These are the intended public API
pub use config::ConnecterOptions;
pub use engine::{
    Connecter, EngineContext, Lifecycle, MonitorEvent, OwnedObject, Poller, PollerClient, Session,
    TimerHandle, TimerId, TimerService,
};
pub use error::Error;
pub use policies::{next_interval, ReconnectBackoff};
pub use reactor::{ConnecterEvent, Reactor, ReactorInterface};
pub use sync::{Condition, WaitResult};
pub use transport::{
    Address, ConnectOutcome, ConnectionAttempt, ConnectionHandle, OpenOutcome, SocketAttempt,
};

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::config::ConnecterOptions;
    pub use crate::error::Error;
    pub use crate::reactor::{ConnecterEvent, Reactor, ReactorInterface};
    pub use crate::sync::{Condition, WaitResult};
    pub use crate::transport::{Address, ConnectionHandle};
}
