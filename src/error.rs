use thiserror::Error;

/// The error type for rustlink operations.
///
/// Only errors the caller can act on end up here. Transient connect failures
/// (refused, reset, unreachable, timed out, out of descriptors) are absorbed
/// by the connecter and retried; they surface as
/// [`ConnecterEvent`](crate::ConnecterEvent)s at most, never as errors.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // I/O and Reactor Errors
    // ============================================================================

    /// Low-level I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal polling mechanism encountered an error.
    #[error("Poll error: {0}")]
    PollError(String),

    /// Attempted to operate on a connecter ID that doesn't exist.
    #[error("Connecter {id} not found")]
    ConnecterNotFound {
        /// The connecter ID that was not found.
        id: usize,
    },

    /// The reactor thread went away while a request was outstanding.
    #[error("Reactor terminated unexpectedly")]
    ReactorTerminated,

    /// The reactor did not destroy the connecter within the allotted time.
    #[error("Timed out waiting for connecter {id} to terminate")]
    TermTimedOut {
        /// The connecter ID that is still alive.
        id: usize,
    },

    // ============================================================================
    // Endpoint Errors
    // ============================================================================

    /// The endpoint string could not be parsed or resolved.
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// The endpoint names a protocol this build does not support.
    #[error("Unsupported protocol '{got}', expected one of: {}", .valid.join(", "))]
    UnsupportedProtocol { got: String, valid: Vec<String> },

    // ============================================================================
    // Configuration Errors
    // ============================================================================

    /// Configuration file parsing or key lookup failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value was well-formed but not usable.
    #[error("Invalid value for '{key}': {reason}")]
    InvalidOption { key: String, reason: String },
}
