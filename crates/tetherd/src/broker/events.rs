//! Pending-event queue and the callback objects that feed it.
//!
//! The protocol has no push channel: when a host-side callback fires, a
//! record of the firing is queued and delivered piggy-backed on the next
//! outgoing response of any kind.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tether_wire::{EventRecord, Handle};

use super::registry::ObjectRegistry;
use super::value::{BrokerObject, FUNCTION_TYPE, ObjectError, Value};

/// Ordered, unbounded queue of pending event records.
///
/// Append-only from the perspective of firing callbacks; fully drained
/// exactly once per response construction.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Vec<EventRecord>>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the queue.
    pub fn append(&self, record: EventRecord) {
        self.lock().push(record);
    }

    /// Atomically takes every pending record, leaving the queue empty.
    pub fn drain(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.lock())
    }

    /// Whether any records are pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EventRecord>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callable minted by `catchevent` for a callback subject.
///
/// Invoking it links the raw argument list into the registry and appends an
/// event record naming the subject handle, so the remote client learns about
/// the firing with its arguments intact.
#[derive(Debug)]
pub struct EventCallback {
    subject: Handle,
    registry: Arc<ObjectRegistry>,
    events: Arc<EventQueue>,
}

impl EventCallback {
    /// Creates a callback recording firings against `subject`.
    pub fn new(subject: Handle, registry: Arc<ObjectRegistry>, events: Arc<EventQueue>) -> Self {
        Self {
            subject,
            registry,
            events,
        }
    }

    /// Handle of the callback subject.
    pub fn subject(&self) -> Handle {
        self.subject
    }
}

impl BrokerObject for EventCallback {
    fn type_name(&self) -> &'static str {
        FUNCTION_TYPE
    }

    fn attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, ObjectError> {
        let linked_args = self.registry.link(Value::List(args));
        self.events
            .append(EventRecord::new(self.subject, unix_millis(), linked_args));
        Ok(Value::Null)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| {
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    })
}
