//! Error types for listener setup and supervision.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Host name resolution produced no usable address.
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the TCP listener failed.
    #[error("failed to bind tcp listener on {addr}: {source}")]
    BindTcp {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding the Unix listener failed.
    #[error("failed to bind unix listener on '{path}': {source}")]
    BindUnix {
        /// Socket path that could not be bound.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading metadata for an existing socket path failed.
    #[error("failed to inspect socket path '{path}': {source}")]
    UnixMetadata {
        /// Socket path being inspected.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// An existing path is not a socket.
    #[error("socket path '{path}' exists and is not a socket")]
    UnixNotSocket {
        /// Offending path.
        path: String,
    },
    /// Another process is already serving on the socket.
    #[error("socket '{path}' is already in use")]
    UnixInUse {
        /// Socket path in use.
        path: String,
    },
    /// Probing an existing socket failed.
    #[error("failed to probe socket '{path}': {source}")]
    UnixConnect {
        /// Socket path being probed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket file failed.
    #[error("failed to remove stale socket '{path}': {source}")]
    UnixCleanup {
        /// Stale socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unix endpoints are unsupported on this platform.
    #[error("unix socket endpoint '{endpoint}' is not supported on this platform")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to configure non-blocking accept: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept-loop thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
