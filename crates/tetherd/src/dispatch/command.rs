//! The closed command surface of the broker protocol.
//!
//! The request's `command` field is parsed against an explicit enum mapped to
//! fixed handlers. There is no name-based method lookup: a command either
//! matches a variant here or is rejected with an error envelope, keeping the
//! remotely reachable surface auditable.

use super::errors::DispatchError;

/// A parsed protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Command handled at the connection level.
    Connection(ConnectionCommand),
    /// Operation executed against the shared registry.
    Registry(RegistryOp),
}

/// Commands that manage the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Write the request unit back verbatim.
    Echo,
    /// Close this connection after responding.
    Quit,
    /// Close this connection, then terminate the whole process.
    QuitServer,
}

/// Registry-bound operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOp {
    /// Marshal a raw JSON argument into the registry's value model.
    Link,
    /// Remove handles; absent handles are ignored.
    Unlink,
    /// Clear the registry and reset handle allocation.
    Purge,
    /// Read a named attribute off a referenced object.
    GetAttr,
    /// Assign a named attribute on a referenced object.
    SetAttr,
    /// Walk a path of attribute/index steps from a referenced object.
    Dive,
    /// Invoke a referenced object as a callable.
    CallThis,
    /// Invoke a named method on a referenced object.
    CallMethod,
    /// Mint an event-catching callback for a referenced subject.
    CatchEvent,
    /// Evaluate an expression through the host evaluator.
    Eval,
    /// Evaluate an expression, discarding results and swallowing faults.
    QueuedEval,
}

impl Command {
    /// Parses a command name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownCommand`] when the name matches no
    /// variant.
    pub fn parse(name: &str) -> Result<Self, DispatchError> {
        match name.to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Connection(ConnectionCommand::Echo)),
            "quit" => Ok(Self::Connection(ConnectionCommand::Quit)),
            "quitserver" => Ok(Self::Connection(ConnectionCommand::QuitServer)),
            "link" => Ok(Self::Registry(RegistryOp::Link)),
            "unlink" => Ok(Self::Registry(RegistryOp::Unlink)),
            "purge" => Ok(Self::Registry(RegistryOp::Purge)),
            "getattr" => Ok(Self::Registry(RegistryOp::GetAttr)),
            "setattr" => Ok(Self::Registry(RegistryOp::SetAttr)),
            "dive" => Ok(Self::Registry(RegistryOp::Dive)),
            "callthis" => Ok(Self::Registry(RegistryOp::CallThis)),
            "callmethod" => Ok(Self::Registry(RegistryOp::CallMethod)),
            "catchevent" => Ok(Self::Registry(RegistryOp::CatchEvent)),
            "eval" => Ok(Self::Registry(RegistryOp::Eval)),
            "qeval" => Ok(Self::Registry(RegistryOp::QueuedEval)),
            _ => Err(DispatchError::unknown_command(name)),
        }
    }
}

impl RegistryOp {
    /// Canonical wire name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Unlink => "unlink",
            Self::Purge => "purge",
            Self::GetAttr => "getattr",
            Self::SetAttr => "setattr",
            Self::Dive => "dive",
            Self::CallThis => "callthis",
            Self::CallMethod => "callmethod",
            Self::CatchEvent => "catchevent",
            Self::Eval => "eval",
            Self::QueuedEval => "qeval",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("echo", Command::Connection(ConnectionCommand::Echo))]
    #[case("QUIT", Command::Connection(ConnectionCommand::Quit))]
    #[case("QuitServer", Command::Connection(ConnectionCommand::QuitServer))]
    #[case("link", Command::Registry(RegistryOp::Link))]
    #[case("GETATTR", Command::Registry(RegistryOp::GetAttr))]
    #[case("callmethod", Command::Registry(RegistryOp::CallMethod))]
    #[case("qeval", Command::Registry(RegistryOp::QueuedEval))]
    fn parses_known_commands_case_insensitively(#[case] name: &str, #[case] expected: Command) {
        assert_eq!(Command::parse(name).ok(), Some(expected));
    }

    #[test]
    fn rejects_unknown_commands() {
        let result = Command::parse("noSuchOp");
        assert!(matches!(result, Err(DispatchError::UnknownCommand { .. })));
    }

    #[test]
    fn registry_ops_report_their_wire_names() {
        assert_eq!(RegistryOp::CatchEvent.as_str(), "catchevent");
        assert_eq!(RegistryOp::QueuedEval.as_str(), "qeval");
    }
}
