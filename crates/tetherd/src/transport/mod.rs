//! Socket transport for the broker daemon.
//!
//! Binds the configured endpoint, accepts connections on a background
//! thread, and hands each accepted stream to a [`ConnectionHandler`] on its
//! own thread. The dispatch layer plugs in through the handler trait; this
//! module knows nothing about the wire protocol.

mod errors;
mod listener;
mod stream;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};

pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
