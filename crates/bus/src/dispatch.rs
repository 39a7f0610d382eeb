//! Synchronous, fail-fast dispatch.

use std::sync::Arc;

use serde_json::Value;
use tandem_transaction::TransactionContext;
use tracing::{debug, warn};

use crate::error::Error;
use crate::event::Event;
use crate::registry::Registry;

/// Per-receiver outcomes for one emission, in registration order.
#[derive(Clone, Debug, Default)]
pub struct DispatchResult {
    outcomes: Vec<Value>,
}

impl DispatchResult {
    /// The value each receiver returned, in registration order.
    #[must_use]
    pub fn outcomes(&self) -> &[Value] {
        &self.outcomes
    }

    /// Number of receivers that ran.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.len()
    }
}

/// Invokes registered receivers on the calling thread.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Creates a dispatcher reading from `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Invokes every receiver for `event` in registration order, passing the
    /// transaction scope captured by the emitter.
    ///
    /// There is no thread handoff and no queue: each receiver runs to
    /// completion on the calling thread before the next starts, and the call
    /// blocks for the cumulative duration of all of them.
    ///
    /// # Errors
    ///
    /// [`Error::Receiver`] for the first receiver that fails; receivers
    /// after it are not invoked. Deciding what the failure means for the
    /// transaction scope is the caller's job.
    pub fn dispatch(
        &self,
        event: &Event,
        txn: Option<&TransactionContext>,
    ) -> Result<DispatchResult, Error> {
        let snapshot = self.registry.receivers_for(event.kind());
        debug!(
            kind = event.kind(),
            dispatch_id = %event.dispatch_id(),
            receivers = snapshot.len(),
            "dispatching event"
        );
        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (index, receiver) in snapshot.iter().enumerate() {
            match receiver.receive(event, txn) {
                Ok(outcome) => outcomes.push(outcome),
                Err(cause) => {
                    warn!(
                        kind = event.kind(),
                        dispatch_id = %event.dispatch_id(),
                        index,
                        %cause,
                        "receiver failed, halting dispatch"
                    );
                    return Err(Error::Receiver {
                        kind: event.kind().to_string(),
                        index,
                        cause,
                    });
                }
            }
        }
        Ok(DispatchResult { outcomes })
    }
}
