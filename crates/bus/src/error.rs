//! Error types for the event bus.

use thiserror::Error;

/// Event bus errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A receiver failed; receivers registered after it were not invoked.
    ///
    /// The dispatch never swallows this: it always reaches the code that
    /// emitted the event, which decides what it means for the enclosing
    /// transaction scope.
    #[error("receiver {index} for event kind '{kind}' failed: {cause}")]
    Receiver {
        /// Kind of the event being dispatched.
        kind: String,
        /// Zero-based registration index of the failing receiver.
        index: usize,
        /// The error the receiver returned.
        cause: anyhow::Error,
    },

    /// A transaction action failed and its scope was rolled back cleanly.
    #[error("transaction rolled back: {cause}")]
    Aborted {
        /// The failure that triggered the rollback.
        cause: anyhow::Error,
    },

    /// A transaction state or undo-replay error.
    #[error(transparent)]
    Transaction(#[from] tandem_transaction::Error),
}
