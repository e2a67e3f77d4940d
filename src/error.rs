//! Fatal reactor errors.
//!
//! Anything in here stops the event loop. Client-scoped failures never
//! surface as a `ReactorError`; they are reported to the handler as events.

use crate::config::ConfigError;
use std::collections::TryReserveError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that terminate the reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The configuration cannot be used, e.g. an unparsable listen address
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Creating the listening socket failed
    #[error("Create error: {0}")]
    Socket(#[source] io::Error),

    /// Binding the listening socket failed
    #[error("Bind error {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// Listening on the bound socket failed
    #[error("Listen error {addr}: {source}")]
    Listen { addr: SocketAddr, source: io::Error },

    /// Registering a socket with the poll registry failed
    #[error("Register error: {0}")]
    Register(#[source] io::Error),

    /// The readiness poll itself failed
    #[error("Poll error: {0}")]
    Poll(#[source] io::Error),

    /// A client buffer could not be allocated
    #[error("Memory error allocating buffer for slot {slot}: {source}")]
    BufferAlloc {
        slot: usize,
        source: TryReserveError,
    },

    /// An occupied slot was serviced without an allocated buffer
    #[error("Internal buffer error: slot {slot} has no buffer")]
    MissingBuffer { slot: usize },
}

/// Result type for reactor operations.
pub type Result<T> = std::result::Result<T, ReactorError>;
