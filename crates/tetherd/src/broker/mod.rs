//! Object-brokering core: registry, marshaling, events, and evaluation.
//!
//! The [`Broker`] owns the process-wide shared state — one handle registry
//! and one event queue serving every connection — and implements the
//! registry-bound operations the dispatcher exposes. Operations resolve and
//! unwrap their own handle arguments; the dispatcher only parses envelopes
//! and frames results.

mod eval;
mod events;
mod marshal;
mod registry;
mod value;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use tether_wire::{Handle, TaggedArg};

pub use eval::{EvalFault, ExpressionEvaluator, LiteralEvaluator, UnsupportedEvaluator};
pub use events::{EventCallback, EventQueue};
pub use marshal::{Marshaler, UnwrapError, WrapContext};
pub use registry::{ObjectRegistry, UnknownHandle};
pub use value::{BrokerObject, DataObject, FUNCTION_TYPE, OBJECT_TYPE, ObjectError, Value};

#[cfg(test)]
pub use eval::MockExpressionEvaluator;

/// Tracing target for broker operations.
pub(crate) const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broker");

/// Errors raised while executing registry-bound operations.
///
/// Every variant is a per-request fault: the dispatcher frames it as an
/// error envelope and the connection continues.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A handle failed to resolve through the registry.
    #[error(transparent)]
    UnknownHandle(#[from] UnknownHandle),
    /// An incoming tagged argument failed to resolve.
    #[error(transparent)]
    Unwrap(#[from] UnwrapError),
    /// A broker object rejected the requested operation.
    #[error(transparent)]
    Object(#[from] ObjectError),
    /// An intermediate step was absent during a dive.
    #[error("cannot dive: no step '{step}' after '{path}'")]
    CannotDive {
        /// Dotted path of the steps that resolved, or `<root>`.
        path: String,
        /// The step that failed to resolve.
        step: String,
    },
    /// The referenced value cannot be invoked.
    #[error("value of type '{type_tag}' is not callable")]
    NotCallable {
        /// Kind of the referenced value.
        type_tag: &'static str,
    },
    /// The referenced value does not carry mutable attributes.
    #[error("cannot set attribute on value of type '{type_tag}'")]
    NoAttributes {
        /// Kind of the referenced value.
        type_tag: &'static str,
    },
}

/// The broker core shared by every connection.
pub struct Broker {
    registry: Arc<ObjectRegistry>,
    events: Arc<EventQueue>,
    marshaler: Marshaler,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Broker")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Creates a broker with an empty registry and the given evaluator.
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let registry = Arc::new(ObjectRegistry::new());
        let events = Arc::new(EventQueue::new());
        let marshaler = Marshaler::new(Arc::clone(&registry), Arc::clone(&events));
        Self {
            registry,
            events,
            marshaler,
            evaluator,
        }
    }

    /// Shared handle registry.
    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// Shared pending-event queue.
    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    /// Marshaler over the shared registry and queue.
    pub fn marshaler(&self) -> &Marshaler {
        &self.marshaler
    }

    /// Removes the given handles from the registry; absent handles are a
    /// no-op.
    pub fn unlink(&self, handles: &[Handle]) {
        self.registry.unlink(handles);
    }

    /// Clears the registry and resets handle allocation.
    pub fn purge(&self) {
        self.registry.purge();
    }

    /// Reads a named attribute off the referenced value.
    ///
    /// An absent attribute reads as null rather than faulting; `dive` is the
    /// strict traversal path.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownHandle`] when the handle does not
    /// resolve.
    pub fn get_attr(&self, handle: Handle, name: &str) -> Result<Value, BrokerError> {
        let target = self.registry.get(handle)?;
        Ok(target.step(name).unwrap_or(Value::Null))
    }

    /// Unwraps the argument, assigns it to the named attribute, and returns
    /// the assigned value.
    ///
    /// # Errors
    ///
    /// Fails when the handle does not resolve, the argument does not unwrap,
    /// or the referenced value rejects attribute writes.
    pub fn set_attr(
        &self,
        handle: Handle,
        name: &str,
        arg: &TaggedArg,
    ) -> Result<Value, BrokerError> {
        let target = self.registry.get(handle)?;
        let Value::Object(object) = target else {
            return Err(BrokerError::NoAttributes {
                type_tag: target.describe(),
            });
        };
        let value = self.marshaler.resolve(arg)?;
        object.set_attr(name, value.clone())?;
        Ok(value)
    }

    /// Walks attribute/index steps starting from the referenced value and
    /// returns the raw terminal value for the caller to wrap.
    ///
    /// Presence is strict key-presence: a present-but-falsy intermediate
    /// value is a valid step.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::CannotDive`] naming the resolved prefix and the
    /// failing step when an intermediate value is absent.
    pub fn dive(&self, handle: Handle, steps: &[String]) -> Result<Value, BrokerError> {
        let mut current = self.registry.get(handle)?;
        let mut walked: Vec<&str> = Vec::new();
        for step in steps {
            match current.step(step) {
                Some(next) => {
                    current = next;
                    walked.push(step);
                }
                None => {
                    let path = if walked.is_empty() {
                        "<root>".to_owned()
                    } else {
                        walked.join(".")
                    };
                    return Err(BrokerError::CannotDive {
                        path,
                        step: step.clone(),
                    });
                }
            }
        }
        Ok(current)
    }

    /// Unwraps the arguments and invokes the referenced value as a callable
    /// with itself as receiver.
    ///
    /// # Errors
    ///
    /// Fails when the handle does not resolve, an argument does not unwrap,
    /// or the referenced value is not callable.
    pub fn call_this(&self, handle: Handle, args: &[TaggedArg]) -> Result<Value, BrokerError> {
        let target = self.registry.get(handle)?;
        let Value::Object(object) = target else {
            return Err(BrokerError::NotCallable {
                type_tag: target.describe(),
            });
        };
        let values = self.marshaler.unwrap(args)?;
        Ok(object.call(values)?)
    }

    /// Unwraps the arguments and invokes the named method on the referenced
    /// value.
    ///
    /// # Errors
    ///
    /// Fails when the handle does not resolve, an argument does not unwrap,
    /// the method is absent ("no such function"), or the invocation itself
    /// raises.
    pub fn call_method(
        &self,
        handle: Handle,
        name: &str,
        args: &[TaggedArg],
    ) -> Result<Value, BrokerError> {
        let target = self.registry.get(handle)?;
        let Value::Object(object) = target else {
            return Err(BrokerError::Object(ObjectError::no_such_method(name)));
        };
        let values = self.marshaler.unwrap(args)?;
        Ok(object.call_method(name, values)?)
    }

    /// Mints an event-catching callback for the given subject handle.
    ///
    /// The subject must resolve; the returned callback is a fresh value the
    /// caller wraps (and thereby links) for the client.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownHandle`] when the subject does not
    /// resolve.
    pub fn catch_event(&self, subject: Handle) -> Result<Value, BrokerError> {
        self.registry.get(subject)?;
        Ok(Value::Object(Arc::new(EventCallback::new(
            subject,
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
        ))))
    }

    /// Evaluates an expression through the injected evaluator.
    ///
    /// # Errors
    ///
    /// Propagates the evaluator's [`EvalFault`] for the dispatcher to frame
    /// in the evaluation-fault envelope shape.
    pub fn evaluate(&self, expression: &str) -> Result<Value, EvalFault> {
        self.evaluator.evaluate(expression)
    }

    /// Evaluates an expression, discarding the result and swallowing faults.
    ///
    /// The fire-and-forget path: failures are logged at debug level and
    /// never reach the client.
    pub fn evaluate_queued(&self, expression: &str) {
        if let Err(fault) = self.evaluator.evaluate(expression) {
            debug!(
                target: BROKER_TARGET,
                fault = %fault,
                "queued evaluation fault swallowed"
            );
        }
    }
}
