//! Handle table exposing live objects as opaque numeric references.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use tether_wire::Handle;

use super::value::Value;

/// Shared table mapping handles to live values.
///
/// One registry serves every connection of a broker instance, so all access
/// goes through a single interior lock. Handle allocation is monotonic:
/// handles start at 1, only grow, and are never reused while the registry is
/// alive — `purge` is the only reset, and it invalidates every handle issued
/// before it.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<Handle, Value>,
    last_handle: Handle,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value and returns its freshly allocated handle.
    pub fn link(&self, value: Value) -> Handle {
        let mut state = self.lock();
        state.last_handle += 1;
        let handle = state.last_handle;
        state.entries.insert(handle, value);
        handle
    }

    /// Returns the value referenced by `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownHandle`] when the handle was never issued, was
    /// unlinked, or predates a purge.
    pub fn get(&self, handle: Handle) -> Result<Value, UnknownHandle> {
        self.lock()
            .entries
            .get(&handle)
            .cloned()
            .ok_or(UnknownHandle { handle })
    }

    /// Removes the given handles; absent handles are ignored.
    pub fn unlink(&self, handles: &[Handle]) {
        let mut state = self.lock();
        for handle in handles {
            state.entries.remove(handle);
        }
    }

    /// Drops every entry and resets the handle counter to its initial value.
    pub fn purge(&self) {
        *self.lock() = RegistryState::default();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    // State is plain data and critical sections are short; a poisoned lock
    // still holds a consistent table.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Error raised when dereferencing a handle the registry does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown handle: {handle}")]
pub struct UnknownHandle {
    /// The handle that failed to resolve.
    pub handle: Handle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_distinct_and_monotonic() {
        let registry = ObjectRegistry::new();
        let first = registry.link(Value::Null);
        let second = registry.link(Value::Bool(true));
        let third = registry.link(Value::String("x".to_owned()));
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    }

    #[test]
    fn unlinked_handles_are_not_reused() {
        let registry = ObjectRegistry::new();
        let first = registry.link(Value::Null);
        registry.unlink(&[first]);
        let second = registry.link(Value::Null);
        assert_ne!(first, second);
    }

    #[test]
    fn get_resolves_linked_values() {
        let registry = ObjectRegistry::new();
        let handle = registry.link(Value::Bool(false));
        assert_eq!(registry.get(handle), Ok(Value::Bool(false)));
    }

    #[test]
    fn get_reports_unknown_handles() {
        let registry = ObjectRegistry::new();
        assert_eq!(registry.get(7), Err(UnknownHandle { handle: 7 }));
    }

    #[test]
    fn unlink_is_idempotent() {
        let registry = ObjectRegistry::new();
        let handle = registry.link(Value::Null);
        registry.unlink(&[handle]);
        registry.unlink(&[handle]);
        assert!(registry.is_empty());
    }

    #[test]
    fn purge_invalidates_prior_handles_and_resets_allocation() {
        let registry = ObjectRegistry::new();
        let before = registry.link(Value::Null);
        registry.purge();
        assert_eq!(registry.get(before), Err(UnknownHandle { handle: before }));
        assert_eq!(registry.link(Value::Null), 1);
    }
}
