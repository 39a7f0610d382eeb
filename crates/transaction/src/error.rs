//! Error types for transaction scopes.

use thiserror::Error;

use crate::context::{ScopeId, ScopeState};

/// Transaction scope errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The scope is not the innermost open scope on the calling thread.
    #[error("transaction scope {0} is not the active scope on this thread")]
    NotActive(ScopeId),

    /// The scope was already committed or rolled back.
    #[error("transaction scope {0} is already {1}")]
    AlreadyClosed(ScopeId, ScopeState),

    /// An undo action failed during rollback. The chain may be left partially
    /// undone; callers must treat the context tree as unrecoverable.
    #[error("undo failed while rolling back transaction scope {id}: {cause}")]
    Undo {
        /// Scope whose rollback hit the failure.
        id: ScopeId,
        /// The first undo failure encountered during replay.
        cause: anyhow::Error,
    },
}
