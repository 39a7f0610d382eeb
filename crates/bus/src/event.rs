//! Events delivered to receivers.

use std::thread::{self, ThreadId};

use serde_json::Value;
use uuid::Uuid;

/// An immutable record of something that happened.
///
/// Constructed at emit time, stamped with the emitting thread's identity,
/// and discarded once dispatch completes.
#[derive(Clone, Debug)]
pub struct Event {
    kind: String,
    payload: Value,
    emitted_thread: ThreadId,
    dispatch_id: Uuid,
}

impl Event {
    /// Creates an event stamped with the calling thread's identity.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            emitted_thread: thread::current().id(),
            dispatch_id: Uuid::new_v4(),
        }
    }

    /// The kind receivers subscribe to.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The opaque payload supplied at emit time.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Identity of the thread that emitted the event.
    #[must_use]
    pub const fn emitted_thread(&self) -> ThreadId {
        self.emitted_thread
    }

    /// Correlation id for this emission's log lines.
    #[must_use]
    pub const fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }
}
