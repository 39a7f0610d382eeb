//! Append-only log of reversible effects for one transaction chain.

use std::fmt;

use tracing::error;

use crate::context::ScopeId;

/// Undo action reversing one recorded write.
pub type UndoFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// One reversible effect recorded while a transaction scope was open.
pub struct ChangeRecord {
    scope: ScopeId,
    undo: UndoFn,
}

impl ChangeRecord {
    fn new(scope: ScopeId, undo: UndoFn) -> Self {
        Self { scope, undo }
    }

    /// Scope the record is attributed to.
    #[must_use]
    pub const fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Append-only record of reversible effects, consulted on rollback.
///
/// Records are discarded on outermost commit and re-attributed to the parent
/// scope on nested commit; rollback drains everything a scope produced.
#[derive(Debug, Default)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn append(&mut self, scope: ScopeId, undo: UndoFn) {
        self.records.push(ChangeRecord::new(scope, undo));
    }

    /// Re-attributes `child`'s remaining records to `parent` (nested commit).
    pub(crate) fn merge(&mut self, child: ScopeId, parent: ScopeId) {
        for record in &mut self.records {
            if record.scope == child {
                record.scope = parent;
            }
        }
    }

    /// Removes and returns every record at or past `offset`, insertion order.
    pub(crate) fn drain_from(&mut self, offset: usize) -> Vec<ChangeRecord> {
        if offset >= self.records.len() {
            return Vec::new();
        }
        self.records.split_off(offset)
    }

    pub(crate) fn discard(&mut self) {
        self.records.clear();
    }
}

/// Applies `records` in reverse insertion order.
///
/// Replay is best-effort complete: every undo is attempted even after one
/// fails, and the first failure encountered is returned.
pub(crate) fn replay(records: Vec<ChangeRecord>) -> Result<(), anyhow::Error> {
    let mut first_failure = None;
    for record in records.into_iter().rev() {
        let scope = record.scope;
        if let Err(cause) = (record.undo)() {
            error!(scope, %cause, "undo action failed during rollback");
            if first_failure.is_none() {
                first_failure = Some(cause);
            }
        }
    }
    first_failure.map_or(Ok(()), Err)
}
