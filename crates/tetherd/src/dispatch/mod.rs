//! Request dispatch: command parsing, argument extraction, and the
//! per-connection session loop.
//!
//! The dispatcher sits between the transport layer and the broker core: it
//! turns framed request units into typed commands, runs them, and frames the
//! outcome. All per-request failures are converted to error envelopes here —
//! nothing a client sends can crash the connection, let alone the process.

mod args;
mod command;
mod errors;
mod response;
mod session;

pub use self::command::{Command, ConnectionCommand, RegistryOp};
pub use self::errors::DispatchError;
pub use self::response::ResponseWriter;
pub use self::session::BrokerConnectionHandler;
