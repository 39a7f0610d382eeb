//! Transaction scope handles.

use std::fmt;

/// Process-unique identifier of a transaction scope.
pub type ScopeId = u64;

/// Lifecycle state of a transaction scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeState {
    /// The scope is open and accepting change records.
    Open,
    /// The scope committed; its records merged upward or became durable.
    Committed,
    /// The scope rolled back; its records were replayed in reverse.
    RolledBack,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Handle to a transaction scope opened on the calling thread.
///
/// A handle is only meaningful on the thread that opened the scope: commit
/// and rollback resolve the calling thread's stack, so using a handle from
/// any other thread reports the scope as not active.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    id: ScopeId,
    parent: Option<ScopeId>,
}

impl TransactionContext {
    pub(crate) const fn new(id: ScopeId, parent: Option<ScopeId>) -> Self {
        Self { id, parent }
    }

    /// The scope's process-unique id.
    #[must_use]
    pub const fn id(&self) -> ScopeId {
        self.id
    }

    /// Id of the enclosing scope, if this scope is nested.
    #[must_use]
    pub const fn parent_id(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Whether this scope was opened inside another open scope.
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}
