//! Tether broker daemon.
//!
//! The daemon lets a remote client hold numeric handles to live objects in
//! this process and inspect, mutate, and invoke them over a
//! newline-delimited JSON protocol on a raw socket. The crate is layered
//! bottom-up:
//!
//! - [`broker`] — the object-brokering core: handle registry, value model,
//!   marshaling rules, pending-event queue, and the pluggable expression
//!   evaluator.
//! - [`framing`](Framer) — extraction of complete request units from the
//!   inbound byte stream.
//! - `dispatch` — the closed command surface and the per-connection session
//!   loop.
//! - `transport` — socket listener, thread-per-connection.
//! - `bootstrap` — staged startup wiring the above together behind
//!   injectable seams for configuration, evaluation, and termination.
//!
//! One registry and one event queue are shared by every connection: a handle
//! minted on one socket resolves on another, and callback firings ride out
//! on whichever response is built next.

pub mod broker;

mod bootstrap;
mod dispatch;
mod framing;
mod process;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, RunError, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with, run_daemon,
};
pub use dispatch::{
    BrokerConnectionHandler, Command, ConnectionCommand, DispatchError, RegistryOp, ResponseWriter,
};
pub use framing::Framer;
pub use process::{
    ProcessTerminator, ShutdownError, ShutdownSignal, SystemShutdownSignal, SystemTerminator,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle, SocketListener,
};
