//! Value marshaling between in-process values and wire payloads.

use std::sync::Arc;

use serde_json::Value as Json;
use thiserror::Error;

use tether_wire::{EventRecord, TaggedArg, WrappedValue};

use super::events::EventQueue;
use super::registry::{ObjectRegistry, UnknownHandle};
use super::value::{OBJECT_TYPE, Value};

/// Wrap context selecting how a result crosses the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WrapContext {
    /// Wrap the value as a single payload.
    #[default]
    Single,
    /// Treat the value as an ordered sequence and wrap each element.
    List,
}

/// Errors raised while resolving incoming tagged arguments.
#[derive(Debug, Error)]
pub enum UnwrapError {
    /// A reference argument named a handle the registry does not hold.
    #[error(transparent)]
    UnknownHandle(#[from] UnknownHandle),
    /// A reference argument did not carry a handle number.
    #[error("reference argument is not a handle number: {value}")]
    InvalidReference {
        /// The malformed argument value.
        value: Json,
    },
}

/// Converts values to wire payloads and wire arguments back to values.
///
/// Wrapping consults the registry for reference-typed values (allocating one
/// fresh handle per wrap) and the event queue when building response
/// payloads; unwrapping resolves handle-tagged arguments through the same
/// registry.
#[derive(Debug)]
pub struct Marshaler {
    registry: Arc<ObjectRegistry>,
    events: Arc<EventQueue>,
}

impl Marshaler {
    /// Creates a marshaler over the shared registry and event queue.
    pub fn new(registry: Arc<ObjectRegistry>, events: Arc<EventQueue>) -> Self {
        Self { registry, events }
    }

    /// Converts a value to its wire representation.
    ///
    /// Primitive scalars pass through untyped; reference-typed values are
    /// linked and replaced by their new handle; list context wraps each
    /// element individually.
    pub fn wrap(&self, value: Value, context: WrapContext) -> WrappedValue {
        match context {
            WrapContext::List => {
                let elements = match value {
                    Value::List(items) => items,
                    other => vec![other],
                };
                WrappedValue::list(
                    elements
                        .into_iter()
                        .map(|element| self.wrap(element, WrapContext::Single))
                        .collect(),
                )
            }
            WrapContext::Single => match value.as_primitive_json() {
                Some(literal) => WrappedValue::primitive(literal),
                None => {
                    let type_tag = value.type_tag().unwrap_or(OBJECT_TYPE);
                    let handle = self.registry.link(value);
                    WrappedValue::reference(handle, type_tag)
                }
            },
        }
    }

    /// Wraps a response payload and drains pending events alongside it.
    ///
    /// This is the only place events are surfaced: records queued since the
    /// previous response ride out exactly once, attached to whichever
    /// response is built next. The returned batch is empty when nothing was
    /// pending.
    pub fn wrap_results(&self, value: Value, context: WrapContext) -> (WrappedValue, Vec<EventRecord>) {
        (self.wrap(value, context), self.events.drain())
    }

    /// Resolves incoming tagged arguments into values.
    ///
    /// # Errors
    ///
    /// Returns [`UnwrapError`] when a reference argument is malformed or
    /// names an unknown handle. Literal arguments convert unconditionally.
    pub fn unwrap(&self, args: &[TaggedArg]) -> Result<Vec<Value>, UnwrapError> {
        args.iter().map(|arg| self.resolve(arg)).collect()
    }

    /// Resolves a single tagged argument.
    ///
    /// # Errors
    ///
    /// Same contract as [`Marshaler::unwrap`].
    pub fn resolve(&self, arg: &TaggedArg) -> Result<Value, UnwrapError> {
        if arg.is_reference() {
            let handle = arg
                .value
                .as_u64()
                .ok_or_else(|| UnwrapError::InvalidReference {
                    value: arg.value.clone(),
                })?;
            Ok(self.registry.get(handle)?)
        } else {
            Ok(Value::from_json(arg.value.clone()))
        }
    }
}
