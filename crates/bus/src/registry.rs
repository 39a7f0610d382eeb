//! Ordered receiver registrations per event kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::receiver::Receiver;

/// Handle returned by subscribe; pass it back to unsubscribe.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    kind: String,
    id: u64,
}

impl SubscriptionHandle {
    /// Event kind the registration listens for.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

#[derive(Clone)]
struct Registration {
    id: u64,
    receiver: Arc<dyn Receiver>,
}

/// Append-ordered receiver registrations, copied on read for dispatch.
///
/// Mutation takes a short write lock; dispatch clones the registration list
/// for the kind, so receivers never run under the lock and an in-flight
/// dispatch is immune to concurrent subscribe/unsubscribe.
#[derive(Default)]
pub struct Registry {
    registrations: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `receiver` at the end of the ordered list for `kind`.
    ///
    /// Registrations for the same kind are never reordered.
    pub fn subscribe(&self, kind: impl Into<String>, receiver: Arc<dyn Receiver>) -> SubscriptionHandle {
        let kind = kind.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations
            .write()
            .entry(kind.clone())
            .or_default()
            .push(Registration { id, receiver });
        SubscriptionHandle { kind, id }
    }

    /// Removes the registration behind `handle`. A no-op when already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut registrations = self.registrations.write();
        if let Some(list) = registrations.get_mut(&handle.kind) {
            list.retain(|registration| registration.id != handle.id);
            if list.is_empty() {
                registrations.remove(&handle.kind);
            }
        }
    }

    /// Snapshot of the receivers for `kind`, in registration order.
    #[must_use]
    pub fn receivers_for(&self, kind: &str) -> Vec<Arc<dyn Receiver>> {
        self.registrations.read().get(kind).map_or_else(Vec::new, |list| {
            list.iter()
                .map(|registration| Arc::clone(&registration.receiver))
                .collect()
        })
    }

    /// Number of live registrations for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.registrations.read().get(kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.registrations.read().len())
            .finish_non_exhaustive()
    }
}
