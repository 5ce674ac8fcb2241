//! Closed value model for everything that crosses the broker boundary.
//!
//! The wire protocol distinguishes primitive scalars, which travel by value,
//! from reference-typed values, which travel as registry handles. Rather than
//! inspecting runtime types, the broker works over an explicit sum type and a
//! capability trait bounding what remote calls can legally target.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

use tether_wire::LIST_TYPE;

/// Runtime type tag for attribute-map objects.
pub const OBJECT_TYPE: &str = "object";
/// Runtime type tag for callable objects.
pub const FUNCTION_TYPE: &str = "function";

/// An in-process value reachable over the protocol.
///
/// `Null`, `Bool`, `Number`, and `String` are primitive scalars; `List` and
/// `Object` are reference-typed and cross the wire as freshly linked handles.
/// Numbers keep the `serde_json` representation so integers round-trip
/// without floating-point drift.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent or explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar, integer or float.
    Number(Number),
    /// Textual scalar.
    String(String),
    /// Ordered sequence snapshot, addressable by numeric index.
    List(Vec<Value>),
    /// Live broker object behind the capability interface.
    Object(Arc<dyn BrokerObject>),
}

impl Value {
    /// Converts an incoming JSON literal into a value.
    ///
    /// Objects become [`DataObject`]s so remote clients can mutate them
    /// through their handle; arrays become list snapshots.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(flag) => Self::Bool(flag),
            Json::Number(number) => Self::Number(number),
            Json::String(text) => Self::String(text),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::Object(Arc::new(DataObject::from_json_map(entries))),
        }
    }

    /// Returns the JSON literal for primitive scalars, `None` otherwise.
    pub fn as_primitive_json(&self) -> Option<Json> {
        match self {
            Self::Null => Some(Json::Null),
            Self::Bool(flag) => Some(Json::Bool(*flag)),
            Self::Number(number) => Some(Json::Number(number.clone())),
            Self::String(text) => Some(Json::String(text.clone())),
            Self::List(_) | Self::Object(_) => None,
        }
    }

    /// Type tag used when the value crosses the wire by reference.
    ///
    /// Primitives have no tag; they are passed through untyped.
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => None,
            Self::List(_) => Some(LIST_TYPE),
            Self::Object(object) => Some(object.type_name()),
        }
    }

    /// Human-readable kind name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => LIST_TYPE,
            Self::Object(object) => object.type_name(),
        }
    }

    /// Reads one traversal step off this value.
    ///
    /// Objects resolve attribute names, lists resolve decimal indices, and
    /// primitives have no steps. Presence is strict: a present-but-falsy
    /// value is a valid step, only a genuinely absent name or index is
    /// `None`.
    pub fn step(&self, name: &str) -> Option<Self> {
        match self {
            Self::Object(object) => object.attr(name),
            Self::List(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned()),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::List(left), Self::List(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

/// Capability interface for live objects exposed through the registry.
///
/// This bounds what remote attribute reads, writes, and invocations can
/// target: only the operations an object kind implements are reachable,
/// replacing unrestricted reflection over arbitrary values.
pub trait BrokerObject: std::fmt::Debug + Send + Sync {
    /// Type tag reported when the object crosses the wire by reference.
    fn type_name(&self) -> &'static str;

    /// Reads a named attribute; `None` when the attribute is absent.
    fn attr(&self, name: &str) -> Option<Value>;

    /// Assigns a named attribute.
    ///
    /// # Errors
    ///
    /// The default implementation rejects writes for object kinds without
    /// mutable attributes.
    fn set_attr(&self, name: &str, value: Value) -> Result<(), ObjectError> {
        let _ = (name, value);
        Err(ObjectError::attributes_read_only(self.type_name()))
    }

    /// Invokes a named method with the object as receiver.
    ///
    /// # Errors
    ///
    /// The default implementation reports every method as absent.
    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, ObjectError> {
        let _ = args;
        Err(ObjectError::no_such_method(name))
    }

    /// Invokes the object itself as a callable.
    ///
    /// # Errors
    ///
    /// The default implementation rejects invocation for non-callable kinds.
    fn call(&self, args: Vec<Value>) -> Result<Value, ObjectError> {
        let _ = args;
        Err(ObjectError::not_callable(self.type_name()))
    }
}

/// Errors raised by operations on broker objects.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The named method does not exist on the receiver.
    #[error("no such function: {name}")]
    NoSuchMethod {
        /// Requested method name.
        name: String,
    },
    /// The receiver cannot be invoked as a callable.
    #[error("value of type '{type_name}' is not callable")]
    NotCallable {
        /// Type tag of the receiver.
        type_name: &'static str,
    },
    /// The receiver does not accept attribute writes.
    #[error("attributes of type '{type_name}' are read-only")]
    AttributesReadOnly {
        /// Type tag of the receiver.
        type_name: &'static str,
    },
    /// Host-side failure raised while executing an invocation.
    #[error("invocation failed: {message}")]
    Invocation {
        /// Diagnostic description from the host object.
        message: String,
    },
}

impl ObjectError {
    /// Creates a missing-method error.
    pub fn no_such_method(name: impl Into<String>) -> Self {
        Self::NoSuchMethod { name: name.into() }
    }

    /// Creates a not-callable error.
    pub const fn not_callable(type_name: &'static str) -> Self {
        Self::NotCallable { type_name }
    }

    /// Creates a read-only-attributes error.
    pub const fn attributes_read_only(type_name: &'static str) -> Self {
        Self::AttributesReadOnly { type_name }
    }

    /// Creates an invocation failure with a diagnostic description.
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }
}

/// Mutable string-keyed attribute map; what a linked JSON object becomes.
#[derive(Debug, Default)]
pub struct DataObject {
    attrs: Mutex<BTreeMap<String, Value>>,
}

impl DataObject {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an object from existing attributes.
    pub fn from_attrs(attrs: BTreeMap<String, Value>) -> Self {
        Self {
            attrs: Mutex::new(attrs),
        }
    }

    fn from_json_map(entries: Map<String, Json>) -> Self {
        Self::from_attrs(
            entries
                .into_iter()
                .map(|(name, json)| (name, Value::from_json(json)))
                .collect(),
        )
    }

    // State is plain data and critical sections are short; a poisoned lock
    // still holds a consistent map.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.attrs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BrokerObject for DataObject {
    fn type_name(&self) -> &'static str {
        OBJECT_TYPE
    }

    fn attr(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<(), ObjectError> {
        self.lock().insert(name.to_owned(), value);
        Ok(())
    }
}
