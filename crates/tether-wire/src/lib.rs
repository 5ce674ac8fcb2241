//! Wire-level protocol types shared by the broker daemon and its clients.
//!
//! The broker speaks newline-delimited JSON over a raw socket: each request is
//! a single-line JSON object terminated by a line feed, and each response is a
//! single JSON object framed the same way. This crate holds the serde types
//! for both directions so the daemon and client-side harnesses agree on the
//! schema without depending on daemon internals.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Opaque numeric reference to a live object held by the broker's registry.
///
/// Handles are positive, allocated monotonically, and never reused while the
/// registry that issued them is alive.
pub type Handle = u64;

/// Tag marking an incoming argument as a handle reference.
pub const REFERENCE_TAG: &str = "o";

/// Type tag applied to list-context wrapped values.
pub const LIST_TYPE: &str = "list";

/// Request envelope sent by a client.
///
/// `command` selects a broker command; `args` carries positional parameters
/// and `msgid` is echoed back verbatim in the response for correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Name of the command to execute. A missing command is rejected by the
    /// dispatcher with an error envelope rather than dropped.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for the command. Registry operations expect a positional
    /// array; connection commands such as `echo` accept any shape.
    #[serde(default)]
    pub args: Json,
    /// Client-chosen correlation token, echoed back in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid: Option<Json>,
}

impl RequestEnvelope {
    /// Builds a request for `command` with the given positional arguments.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<Json>) -> Self {
        Self {
            command: Some(command.into()),
            args: Json::Array(args),
            msgid: None,
        }
    }

    /// Attaches a correlation token to the request.
    #[must_use]
    pub fn with_msgid(mut self, msgid: Json) -> Self {
        self.msgid = Some(msgid);
        self
    }

    /// Positional arguments as a slice.
    ///
    /// Absent or `null` args read as empty; any other non-array shape is
    /// `None` and rejected by registry operations.
    #[must_use]
    pub fn positional(&self) -> Option<&[Json]> {
        match &self.args {
            Json::Null => Some(&[]),
            Json::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Incoming wire argument: `{"t": ..., "v": ...}`.
///
/// A tag of [`REFERENCE_TAG`] means `v` holds a handle to resolve through the
/// registry before use; any other tag means `v` is a literal used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedArg {
    /// Argument tag; [`REFERENCE_TAG`] selects handle resolution.
    #[serde(rename = "t")]
    pub tag: String,
    /// Handle number or literal JSON value, depending on the tag.
    #[serde(rename = "v")]
    pub value: Json,
}

impl TaggedArg {
    /// Builds an argument referencing a registry handle.
    #[must_use]
    pub fn reference(handle: Handle) -> Self {
        Self {
            tag: REFERENCE_TAG.to_owned(),
            value: Json::from(handle),
        }
    }

    /// Builds a literal argument passed by value.
    #[must_use]
    pub fn literal(value: Json) -> Self {
        Self {
            tag: "v".to_owned(),
            value,
        }
    }

    /// Whether this argument must be resolved through the registry.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.tag == REFERENCE_TAG
    }
}

/// Payload of a [`WrappedValue`].
///
/// List-context wrapping nests one wrapped value per element; every other
/// wrapping carries either a primitive literal or a handle number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WrappedResult {
    /// Element-wise wrapped sequence (list context).
    List(Vec<WrappedValue>),
    /// Primitive literal, or a handle number for reference-typed values.
    Literal(Json),
}

/// Wire representation of a value crossing the protocol boundary.
///
/// Primitive scalars travel by value with a `null` type; reference-typed
/// values travel as a freshly allocated handle tagged with their runtime type
/// name; list-context wrapping tags the envelope [`LIST_TYPE`] and wraps each
/// element individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedValue {
    /// Literal, handle, or nested wrapped elements.
    pub result: WrappedResult,
    /// `null` for primitives, otherwise the value's type tag.
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
}

impl WrappedValue {
    /// Wraps a primitive scalar passed by value.
    #[must_use]
    pub const fn primitive(literal: Json) -> Self {
        Self {
            result: WrappedResult::Literal(literal),
            type_tag: None,
        }
    }

    /// Wraps a reference-typed value as a handle with its type tag.
    #[must_use]
    pub fn reference(handle: Handle, type_tag: impl Into<String>) -> Self {
        Self {
            result: WrappedResult::Literal(Json::from(handle)),
            type_tag: Some(type_tag.into()),
        }
    }

    /// Wraps an ordered sequence element-wise (list context).
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self {
            result: WrappedResult::List(items),
            type_tag: Some(LIST_TYPE.to_owned()),
        }
    }

    /// Returns the handle number when this wraps a reference-typed value.
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        match (&self.result, &self.type_tag) {
            (WrappedResult::Literal(literal), Some(tag)) if tag != LIST_TYPE => literal.as_u64(),
            _ => None,
        }
    }
}

/// Asynchronous notification queued when a registered callback fires.
///
/// Records are appended as callbacks fire and delivered piggy-backed on the
/// next outgoing response of any kind, drained exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Handle of the callback subject the firing was registered for.
    pub cbid: Handle,
    /// Creation time in milliseconds since the Unix epoch.
    pub ts: u64,
    /// Handle wrapping the raw invocation arguments.
    pub args: Handle,
}

impl EventRecord {
    /// Builds a record for a firing of `cbid` at `ts` with linked `args`.
    #[must_use]
    pub const fn new(cbid: Handle, ts: u64, args: Handle) -> Self {
        Self { cbid, ts, args }
    }
}

/// Response envelope written by the broker, tagged on `status`.
///
/// Two error shapes share the `error` status: transport and dispatch faults
/// carry a single `error` description, while evaluation faults carry `name`,
/// `message`, and the original expression echoed as `command`. Compliant
/// clients accept both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseEnvelope {
    /// Successful command execution.
    Ok {
        /// Wrapped command result; `null` for commands with no payload.
        result: Option<WrappedValue>,
        /// Correlation token echoed from the request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msgid: Option<Json>,
        /// Pending event records drained at wrap time; absent when none.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        events: Option<Vec<EventRecord>>,
    },
    /// Failed command execution.
    Error {
        /// Diagnostic description for dispatch and transport faults.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Fault class name for evaluation faults.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Fault message for evaluation faults.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Original expression text, echoed for diagnostics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        /// Correlation token echoed from the request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msgid: Option<Json>,
    },
}

impl ResponseEnvelope {
    /// Builds a success envelope carrying a wrapped result.
    #[must_use]
    pub const fn ok(result: WrappedValue, msgid: Option<Json>) -> Self {
        Self::Ok {
            result: Some(result),
            msgid,
            events: None,
        }
    }

    /// Builds a plain ok/null envelope for commands with no payload.
    #[must_use]
    pub const fn ok_empty(msgid: Option<Json>) -> Self {
        Self::Ok {
            result: None,
            msgid,
            events: None,
        }
    }

    /// Builds a fault envelope with a diagnostic description.
    #[must_use]
    pub fn fault(error: impl Into<String>, msgid: Option<Json>) -> Self {
        Self::Error {
            error: Some(error.into()),
            name: None,
            message: None,
            command: None,
            msgid,
        }
    }

    /// Builds an evaluation-fault envelope echoing the failed expression.
    #[must_use]
    pub fn eval_fault(
        name: impl Into<String>,
        message: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self::Error {
            error: None,
            name: Some(name.into()),
            message: Some(message.into()),
            command: Some(command.into()),
            msgid: None,
        }
    }

    /// Attaches drained event records to a success envelope.
    ///
    /// Fault envelopes are returned unchanged: events only ride on successful
    /// responses, matching where the marshaler drains the queue.
    #[must_use]
    pub fn with_events(self, drained: Vec<EventRecord>) -> Self {
        match self {
            Self::Ok { result, msgid, .. } if !drained.is_empty() => Self::Ok {
                result,
                msgid,
                events: Some(drained),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wrapped_primitive_serializes_with_null_type() {
        let wrapped = WrappedValue::primitive(json!(7));
        assert_eq!(
            serde_json::to_value(&wrapped).ok(),
            Some(json!({"result": 7, "type": null}))
        );
    }

    #[test]
    fn wrapped_reference_carries_handle_and_tag() {
        let wrapped = WrappedValue::reference(1, "object");
        assert_eq!(
            serde_json::to_value(&wrapped).ok(),
            Some(json!({"result": 1, "type": "object"}))
        );
        assert_eq!(wrapped.handle(), Some(1));
    }

    #[test]
    fn list_wrapping_nests_elements() {
        let wrapped = WrappedValue::list(vec![
            WrappedValue::primitive(json!("a")),
            WrappedValue::reference(3, "object"),
        ]);
        assert_eq!(
            serde_json::to_value(&wrapped).ok(),
            Some(json!({
                "result": [
                    {"result": "a", "type": null},
                    {"result": 3, "type": "object"},
                ],
                "type": "list",
            }))
        );
        assert_eq!(wrapped.handle(), None);
    }

    #[test]
    fn ok_envelope_matches_wire_shape() {
        let envelope = ResponseEnvelope::ok(WrappedValue::reference(1, "object"), Some(json!(7)));
        assert_eq!(
            serde_json::to_value(&envelope).ok(),
            Some(json!({
                "status": "ok",
                "result": {"result": 1, "type": "object"},
                "msgid": 7,
            }))
        );
    }

    #[test]
    fn empty_ok_envelope_serializes_null_result() {
        let envelope = ResponseEnvelope::ok_empty(None);
        assert_eq!(
            serde_json::to_value(&envelope).ok(),
            Some(json!({"status": "ok", "result": null}))
        );
    }

    #[test]
    fn fault_envelope_carries_description() {
        let envelope = ResponseEnvelope::fault("unknown command: bogus", None);
        assert_eq!(
            serde_json::to_value(&envelope).ok(),
            Some(json!({"status": "error", "error": "unknown command: bogus"}))
        );
    }

    #[test]
    fn eval_fault_envelope_echoes_expression() {
        let envelope = ResponseEnvelope::eval_fault("TypeFault", "not a function", "foo()");
        assert_eq!(
            serde_json::to_value(&envelope).ok(),
            Some(json!({
                "status": "error",
                "name": "TypeFault",
                "message": "not a function",
                "command": "foo()",
            }))
        );
    }

    #[test]
    fn events_attach_only_when_non_empty() {
        let without = ResponseEnvelope::ok_empty(None).with_events(Vec::new());
        assert_eq!(
            serde_json::to_value(&without).ok(),
            Some(json!({"status": "ok", "result": null}))
        );

        let with = ResponseEnvelope::ok_empty(None).with_events(vec![EventRecord::new(2, 5, 9)]);
        assert_eq!(
            serde_json::to_value(&with).ok(),
            Some(json!({
                "status": "ok",
                "result": null,
                "events": [{"cbid": 2, "ts": 5, "args": 9}],
            }))
        );
    }

    #[test]
    fn request_with_reference_argument_round_trips() {
        let request = RequestEnvelope::new(
            "callmethod",
            vec![json!(4), json!("push"), json!([TaggedArg::reference(2)])],
        )
        .with_msgid(json!("m-1"));
        let text = serde_json::to_string(&request).ok();
        let parsed = text.and_then(|line| serde_json::from_str::<RequestEnvelope>(&line).ok());
        assert_eq!(parsed, Some(request));
    }

    #[test]
    fn non_array_args_are_tolerated_but_not_positional() {
        let request = serde_json::from_value::<RequestEnvelope>(
            json!({"command": "echo", "args": {"x": 1}}),
        )
        .ok();
        let request = request.as_ref();
        assert_eq!(
            request.and_then(|envelope| envelope.command.as_deref()),
            Some("echo")
        );
        assert_eq!(request.and_then(RequestEnvelope::positional), None);

        let bare = serde_json::from_value::<RequestEnvelope>(json!({"command": "purge"})).ok();
        assert_eq!(
            bare.as_ref().and_then(RequestEnvelope::positional),
            Some(&[][..])
        );
    }

    #[test]
    fn both_error_shapes_deserialize() {
        let fault = serde_json::from_value::<ResponseEnvelope>(
            json!({"status": "error", "error": "unknown handle: 9"}),
        )
        .ok();
        assert!(matches!(
            fault,
            Some(ResponseEnvelope::Error { error: Some(_), .. })
        ));

        let eval = serde_json::from_value::<ResponseEnvelope>(json!({
            "status": "error",
            "name": "SyntaxFault",
            "message": "unexpected token",
            "command": "1 +",
        }))
        .ok();
        assert!(matches!(
            eval,
            Some(ResponseEnvelope::Error { name: Some(_), .. })
        ));
    }
}
