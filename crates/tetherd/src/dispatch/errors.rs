//! Error types for request parsing and command dispatch.
//!
//! Every per-request failure mode maps to a structured variant with enough
//! context for an actionable error envelope. Only IO faults and oversized
//! framing are fatal to a connection; everything else is reported inline and
//! the session continues.

use std::io;

use serde_json::Value as Json;
use thiserror::Error;

use tether_wire::ResponseEnvelope;

use crate::broker::{BrokerError, EvalFault};

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request unit could not be parsed as a request envelope.
    #[error("malformed request: {message}")]
    MalformedRequest {
        /// Parser diagnostic.
        message: String,
        /// Underlying serde error when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request envelope carried no command field.
    #[error("missing command")]
    MissingCommand,

    /// Command name matched no known command.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// The unrecognised name.
        command: String,
    },

    /// Positional arguments did not match the operation's signature.
    #[error("invalid arguments for {command}: {message}")]
    InvalidArguments {
        /// Wire name of the operation.
        command: &'static str,
        /// Why the arguments were rejected.
        message: String,
    },

    /// A registry operation failed while executing.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The host evaluator rejected an expression.
    #[error("evaluation failed: {fault}")]
    Eval {
        /// Structured fault from the evaluator.
        fault: EvalFault,
        /// The expression that failed, echoed for diagnostics.
        expression: String,
    },

    /// Buffered request data exceeded the framing limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(serde_json::Error),
}

impl DispatchError {
    /// Creates a malformed-request error from a serde failure.
    pub fn malformed(source: serde_json::Error) -> Self {
        Self::MalformedRequest {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an unknown-command error.
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an invalid-arguments error for the given operation.
    pub fn invalid_arguments(command: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command,
            message: message.into(),
        }
    }

    /// Creates an evaluation error echoing the failed expression.
    pub fn eval(fault: EvalFault, expression: impl Into<String>) -> Self {
        Self::Eval {
            fault,
            expression: expression.into(),
        }
    }

    /// Creates a request-too-large error.
    pub const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Whether this error must tear the connection down.
    ///
    /// Oversized framing leaves no recoverable unit boundary, and IO faults
    /// mean the transport itself failed; everything else is reported inline.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::RequestTooLarge { .. })
    }

    /// Frames this error as a response envelope.
    ///
    /// Evaluation faults use their dedicated wire shape (`name`, `message`,
    /// `command`); every other variant becomes a plain fault with the
    /// display description.
    pub fn to_envelope(&self, msgid: Option<Json>) -> ResponseEnvelope {
        match self {
            Self::Eval { fault, expression } => {
                ResponseEnvelope::eval_fault(&fault.name, &fault.message, expression)
            }
            other => ResponseEnvelope::fault(other.to_string(), msgid),
        }
    }
}
