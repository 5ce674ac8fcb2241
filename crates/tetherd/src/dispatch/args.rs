//! Positional-argument extraction for registry operations.
//!
//! Each operation pulls its own parameters out of the request's positional
//! array; every mismatch maps to an invalid-arguments fault naming the
//! operation, never a panic.

use serde_json::Value as Json;

use tether_wire::{Handle, TaggedArg};

use crate::broker::WrapContext;

use super::command::RegistryOp;
use super::errors::DispatchError;

pub(crate) fn required(args: &[Json], index: usize, op: RegistryOp) -> Result<&Json, DispatchError> {
    args.get(index)
        .ok_or_else(|| DispatchError::invalid_arguments(op.as_str(), format!("missing argument {index}")))
}

pub(crate) fn handle(args: &[Json], index: usize, op: RegistryOp) -> Result<Handle, DispatchError> {
    required(args, index, op)?.as_u64().ok_or_else(|| {
        DispatchError::invalid_arguments(op.as_str(), format!("argument {index} must be a handle number"))
    })
}

pub(crate) fn text<'a>(
    args: &'a [Json],
    index: usize,
    op: RegistryOp,
) -> Result<&'a str, DispatchError> {
    required(args, index, op)?.as_str().ok_or_else(|| {
        DispatchError::invalid_arguments(op.as_str(), format!("argument {index} must be a string"))
    })
}

pub(crate) fn tagged(args: &[Json], index: usize, op: RegistryOp) -> Result<TaggedArg, DispatchError> {
    let raw = required(args, index, op)?;
    serde_json::from_value(raw.clone()).map_err(|error| {
        DispatchError::invalid_arguments(
            op.as_str(),
            format!("argument {index} is not a tagged argument: {error}"),
        )
    })
}

/// Call arguments as one array of tagged values; absent or null means none.
pub(crate) fn tagged_list(
    args: &[Json],
    index: usize,
    op: RegistryOp,
) -> Result<Vec<TaggedArg>, DispatchError> {
    match args.get(index) {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|error| {
            DispatchError::invalid_arguments(
                op.as_str(),
                format!("argument {index} is not a tagged argument array: {error}"),
            )
        }),
    }
}

/// A dive path as one array of attribute names and numeric indices.
pub(crate) fn step_list(
    args: &[Json],
    index: usize,
    op: RegistryOp,
) -> Result<Vec<String>, DispatchError> {
    let raw = required(args, index, op)?;
    let Json::Array(items) = raw else {
        return Err(DispatchError::invalid_arguments(
            op.as_str(),
            format!("argument {index} must be an array of path steps"),
        ));
    };
    items
        .iter()
        .map(|step| match step {
            Json::String(name) => Ok(name.clone()),
            Json::Number(number) => Ok(number.to_string()),
            other => Err(DispatchError::invalid_arguments(
                op.as_str(),
                format!("path step {other} is neither a name nor an index"),
            )),
        })
        .collect()
}

/// Every positional argument as a handle; used by variadic unlink.
pub(crate) fn handle_list(args: &[Json], op: RegistryOp) -> Result<Vec<Handle>, DispatchError> {
    args.iter()
        .enumerate()
        .map(|(index, raw)| {
            raw.as_u64().ok_or_else(|| {
                DispatchError::invalid_arguments(
                    op.as_str(),
                    format!("argument {index} must be a handle number"),
                )
            })
        })
        .collect()
}

/// Optional trailing wrap context: absent or null wraps singly, `"list"`
/// wraps element-wise.
pub(crate) fn wrap_context(
    args: &[Json],
    index: usize,
    op: RegistryOp,
) -> Result<WrapContext, DispatchError> {
    match args.get(index) {
        None | Some(Json::Null) => Ok(WrapContext::Single),
        Some(Json::String(name)) if name == "list" => Ok(WrapContext::List),
        Some(other) => Err(DispatchError::invalid_arguments(
            op.as_str(),
            format!("unknown wrap context: {other}"),
        )),
    }
}
