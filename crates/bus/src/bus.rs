//! Public façade combining registry, dispatcher and transaction manager.

use std::sync::Arc;

use serde_json::Value;
use tandem_transaction::{TransactionContext, TransactionManager};

use crate::dispatch::{DispatchResult, Dispatcher};
use crate::error::Error;
use crate::event::Event;
use crate::receiver::Receiver;
use crate::registry::{Registry, SubscriptionHandle};

/// Synchronous, transaction-aware event bus.
///
/// Receivers run on the emitting thread, in registration order, inside the
/// emitter's active transaction scope. A bus carries no process-wide state:
/// independent instances are fully isolated, and clones share the same
/// registry and transaction manager.
#[derive(Clone, Debug)]
pub struct EventBus {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    transactions: Arc<TransactionManager>,
}

impl EventBus {
    /// Creates a bus with an empty registry and no open transactions.
    #[must_use]
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            transactions: Arc::new(TransactionManager::new()),
        }
    }

    /// The transaction manager, for sharing with collaborating stores.
    #[must_use]
    pub fn transactions(&self) -> Arc<TransactionManager> {
        Arc::clone(&self.transactions)
    }

    /// Registers `receiver` for `kind`, after every existing registration.
    pub fn subscribe<R: Receiver>(
        &self,
        kind: impl Into<String>,
        receiver: R,
    ) -> SubscriptionHandle {
        self.registry.subscribe(kind, Arc::new(receiver))
    }

    /// Removes a registration. A no-op when already removed.
    ///
    /// An in-flight dispatch keeps its snapshot; the removal takes effect
    /// from the next emission.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.registry.unsubscribe(handle);
    }

    /// Emits an event and synchronously dispatches it on the calling thread.
    ///
    /// The event is stamped with the calling thread's identity and dispatched
    /// inside the thread's active transaction scope. With no scope open the
    /// emission is context-free: receivers still run, but there is no
    /// rollback capability for anything they write. The call blocks until
    /// every receiver has returned.
    ///
    /// # Errors
    ///
    /// [`Error::Receiver`] for the first failing receiver. The scope is left
    /// untouched; rolling it back (or not) is the emitter's decision.
    pub fn emit(&self, kind: &str, payload: Value) -> Result<DispatchResult, Error> {
        let event = Event::new(kind, payload);
        let txn = self.transactions.current();
        self.dispatcher.dispatch(&event, txn.as_ref())
    }

    /// Opens a transaction scope on the calling thread.
    #[must_use]
    pub fn begin(&self) -> TransactionContext {
        self.transactions.begin()
    }

    /// Commits `ctx`.
    ///
    /// # Errors
    ///
    /// Propagates [`TransactionManager::commit`] state errors.
    pub fn commit(&self, ctx: &TransactionContext) -> Result<(), Error> {
        Ok(self.transactions.commit(ctx)?)
    }

    /// Rolls back `ctx`.
    ///
    /// # Errors
    ///
    /// Propagates [`TransactionManager::rollback`] state and undo errors.
    pub fn rollback(&self, ctx: &TransactionContext) -> Result<(), Error> {
        Ok(self.transactions.rollback(ctx)?)
    }

    /// Runs `action` inside a fresh transaction scope.
    ///
    /// Commits on success. On failure, rolls back the scope together with
    /// anything still open inside it, so the action's writes and those of
    /// every receiver it synchronously triggered are undone as one unit.
    /// This is the only entry point with that all-or-nothing guarantee.
    ///
    /// # Errors
    ///
    /// [`Error::Aborted`] wrapping the action's failure after a clean
    /// rollback. A failed undo during that rollback surfaces instead as
    /// [`tandem_transaction::Error::Undo`], which means the rollback is
    /// incomplete and the scope's chain is unrecoverable.
    pub fn run_in_transaction<T, F>(&self, action: F) -> Result<T, Error>
    where
        F: FnOnce(&TransactionContext) -> anyhow::Result<T>,
    {
        let ctx = self.transactions.begin();
        match action(&ctx) {
            Ok(value) => {
                self.transactions.commit(&ctx)?;
                Ok(value)
            }
            Err(cause) => {
                self.transactions.unwind(&ctx)?;
                Err(Error::Aborted { cause })
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
