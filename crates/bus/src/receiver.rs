//! The receiver seam.

use serde_json::Value;
use tandem_transaction::TransactionContext;

use crate::event::Event;

/// A registered callable invoked synchronously for matching events.
///
/// `receive` runs on the emitting thread, inside the transaction scope that
/// was active when the dispatch began (`None` for a context-free emission).
/// The returned value is preserved per receiver in the dispatch result; an
/// error halts the remaining dispatch and surfaces to the emitter.
pub trait Receiver: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error returned here stops the dispatch fail-fast and reaches the
    /// code that emitted the event.
    fn receive(&self, event: &Event, txn: Option<&TransactionContext>) -> anyhow::Result<Value>;
}

impl<F> Receiver for F
where
    F: Fn(&Event, Option<&TransactionContext>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn receive(&self, event: &Event, txn: Option<&TransactionContext>) -> anyhow::Result<Value> {
        self(event, txn)
    }
}
