//! Pluggable expression evaluation capability.
//!
//! Dynamic evaluation is inherently environment-specific, so the broker core
//! only defines the seam: expression text in, a value or a structured fault
//! out. Deployments wire in whatever host engine they trust; the default
//! refuses every expression.

use serde_json::Value as Json;
use thiserror::Error;

use super::value::Value;

/// Structured failure raised by an evaluator.
///
/// Carries the fault class and message separately because evaluation faults
/// cross the wire in their own envelope shape, echoing the failed expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct EvalFault {
    /// Fault class name.
    pub name: String,
    /// Human-readable fault message.
    pub message: String,
}

impl EvalFault {
    /// Creates a fault with the given class and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Host expression engine injected into the broker.
#[cfg_attr(test, mockall::automock)]
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates an expression, returning its value or a structured fault.
    ///
    /// # Errors
    ///
    /// Returns [`EvalFault`] when the expression cannot be evaluated; the
    /// dispatcher frames it for the client, it never tears down the
    /// connection.
    fn evaluate(&self, expression: &str) -> Result<Value, EvalFault>;
}

/// Default evaluator for deployments without a host expression engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEvaluator;

impl ExpressionEvaluator for UnsupportedEvaluator {
    fn evaluate(&self, _expression: &str) -> Result<Value, EvalFault> {
        Err(EvalFault::new(
            "EvalUnsupported",
            "no expression evaluator is configured",
        ))
    }
}

/// Evaluator interpreting expressions as JSON literals.
///
/// Useful for protocol-level smoke checks and tests: `{"a": 1}` evaluates to
/// a fresh object, `[1, 2]` to a list, and malformed text to a syntax fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralEvaluator;

impl ExpressionEvaluator for LiteralEvaluator {
    fn evaluate(&self, expression: &str) -> Result<Value, EvalFault> {
        serde_json::from_str::<Json>(expression)
            .map(Value::from_json)
            .map_err(|error| EvalFault::new("SyntaxFault", error.to_string()))
    }
}
