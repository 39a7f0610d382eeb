//! In-memory key-value store that participates in the active transaction.
//!
//! Writes apply immediately, so reads inside the same transaction observe
//! them before commit (there is no isolation barrier). Every mutation
//! registers an undo action with the transaction manager; a rollback of the
//! enclosing scope restores the prior contents. Writes made while no scope
//! is open are durable immediately.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tandem_transaction::TransactionManager;

/// In-memory key-value store.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, Bytes>>>,
    transactions: Arc<TransactionManager>,
}

impl MemoryStore {
    /// Creates an empty store wired to `transactions`.
    #[must_use]
    pub fn new(transactions: Arc<TransactionManager>) -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
            transactions,
        }
    }

    /// Stores `value` under `key`, recording how to restore the prior state.
    pub fn put<K: Into<String>>(&self, key: K, value: Bytes) {
        let key = key.into();
        let previous = self.map.lock().insert(key.clone(), value);
        self.record_restore(key, previous);
    }

    /// Removes `key`, recording how to restore the prior state.
    pub fn del<K: Into<String>>(&self, key: K) {
        let key = key.into();
        let previous = self.map.lock().remove(&key);
        self.record_restore(key, previous);
    }

    /// The value currently stored under `key`, if any.
    #[must_use]
    pub fn get<K: Into<String>>(&self, key: K) -> Option<Bytes> {
        self.map.lock().get(&key.into()).cloned()
    }

    /// Every key currently present, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }

    /// Number of entries currently present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    // Undo actions touch the map directly; they must not record themselves.
    fn record_restore(&self, key: String, previous: Option<Bytes>) {
        let map = Arc::clone(&self.map);
        self.transactions.record(move || {
            let mut map = map.lock();
            match previous {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
            Ok(())
        });
    }
}
