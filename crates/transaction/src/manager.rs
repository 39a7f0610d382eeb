//! Per-thread stacks of nested transaction scopes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::changelog::{self, ChangeLog};
use crate::context::{ScopeId, ScopeState, TransactionContext};
use crate::error::Error;

/// One thread's stack of open scopes plus the chain's change log.
///
/// Scope outcomes are remembered for the life of the chain so a second close
/// of the same scope can report what happened to it the first time.
#[derive(Debug, Default)]
struct Chain {
    stack: Vec<Scope>,
    log: ChangeLog,
    closed: HashMap<ScopeId, ScopeState>,
}

#[derive(Debug)]
struct Scope {
    id: ScopeId,
    parent: Option<ScopeId>,
    offset: usize,
}

/// Coordinates nested transaction scopes, one independent stack per thread.
///
/// Collaborators register undo actions through [`record`](Self::record) for
/// every write they perform while a scope is open; [`rollback`](Self::rollback)
/// replays them in reverse. Chains on distinct threads share nothing beyond
/// the brief map access that locates them, so independent transactions never
/// contend. No lock is held while undo actions run.
#[derive(Debug, Default)]
pub struct TransactionManager {
    chains: RwLock<HashMap<ThreadId, Arc<Mutex<Chain>>>>,
    next_id: AtomicU64,
}

impl TransactionManager {
    /// Creates a manager with no open scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope on the calling thread, nested if one is already open.
    pub fn begin(&self) -> TransactionContext {
        let chain = self.chain_for_current_thread();
        let mut guard = chain.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let parent = guard.stack.last().map(|scope| scope.id);
        let offset = guard.log.len();
        guard.stack.push(Scope { id, parent, offset });
        debug!(scope = id, parent = ?parent, "transaction scope opened");
        TransactionContext::new(id, parent)
    }

    /// Commits `ctx`.
    ///
    /// A nested commit transfers the scope's change records to its parent, so
    /// they stay undoable should the parent later roll back. An outermost
    /// commit discards them: every effect is durable.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] if `ctx` is not the innermost open scope on the
    /// calling thread, [`Error::AlreadyClosed`] if it was closed before.
    pub fn commit(&self, ctx: &TransactionContext) -> Result<(), Error> {
        let chain = self.existing_chain().ok_or(Error::NotActive(ctx.id()))?;
        let mut guard = chain.lock();
        let scope = Self::pop_innermost(&mut guard, ctx)?;
        if let Some(parent) = scope.parent {
            guard.log.merge(scope.id, parent);
            guard.closed.insert(scope.id, ScopeState::Committed);
            debug!(scope = scope.id, parent, "nested scope committed, records merged upward");
        } else {
            guard.log.discard();
            drop(guard);
            self.drop_chain();
            debug!(scope = scope.id, "outermost scope committed, effects durable");
        }
        Ok(())
    }

    /// Rolls back `ctx`, replaying its change records (including records
    /// merged from committed descendants) in reverse insertion order.
    ///
    /// Replay is best-effort complete: every undo is attempted even after one
    /// fails, and the first failure is the one reported.
    ///
    /// # Errors
    ///
    /// [`Error::NotActive`] / [`Error::AlreadyClosed`] as for
    /// [`commit`](Self::commit). [`Error::Undo`] if an undo action failed, in
    /// which case the chain may be partially undone and must be treated as
    /// unrecoverable.
    pub fn rollback(&self, ctx: &TransactionContext) -> Result<(), Error> {
        let chain = self.existing_chain().ok_or(Error::NotActive(ctx.id()))?;
        let mut guard = chain.lock();
        let scope = Self::pop_innermost(&mut guard, ctx)?;
        let records = guard.log.drain_from(scope.offset);
        if scope.parent.is_none() {
            drop(guard);
            self.drop_chain();
        } else {
            guard.closed.insert(scope.id, ScopeState::RolledBack);
            drop(guard);
        }
        debug!(scope = scope.id, records = records.len(), "rolling back scope");
        changelog::replay(records).map_err(|cause| Error::Undo { id: ctx.id(), cause })
    }

    /// Rolls back `ctx` together with every scope still open inside it.
    ///
    /// This is the unwind path for a failure propagating across nested
    /// dispatches: innermost scopes close first, then `ctx` itself, and the
    /// combined records replay in one reverse pass.
    ///
    /// # Errors
    ///
    /// Same as [`rollback`](Self::rollback), except `ctx` may be any open
    /// scope on the calling thread rather than the innermost one.
    pub fn unwind(&self, ctx: &TransactionContext) -> Result<(), Error> {
        let chain = self.existing_chain().ok_or(Error::NotActive(ctx.id()))?;
        let mut guard = chain.lock();
        let Some(position) = guard.stack.iter().position(|scope| scope.id == ctx.id()) else {
            return Err(Self::closed_or_not_active(&guard, ctx));
        };
        let removed = guard.stack.split_off(position);
        let offset = removed.first().map_or(0, |scope| scope.offset);
        let outermost = removed.first().is_some_and(|scope| scope.parent.is_none());
        for scope in &removed {
            guard.closed.insert(scope.id, ScopeState::RolledBack);
        }
        let records = guard.log.drain_from(offset);
        drop(guard);
        if outermost {
            self.drop_chain();
        }
        debug!(
            scope = ctx.id(),
            unwound = removed.len(),
            records = records.len(),
            "unwinding scope and open descendants"
        );
        changelog::replay(records).map_err(|cause| Error::Undo { id: ctx.id(), cause })
    }

    /// Appends an undo action attributed to the calling thread's innermost
    /// open scope.
    ///
    /// When no scope is open nothing is recorded: the write it would reverse
    /// is durable immediately.
    pub fn record<F>(&self, undo: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let Some(chain) = self.existing_chain() else {
            return;
        };
        let mut guard = chain.lock();
        let Some(scope_id) = guard.stack.last().map(|scope| scope.id) else {
            return;
        };
        guard.log.append(scope_id, Box::new(undo));
        debug!(scope = scope_id, "change recorded");
    }

    /// The calling thread's innermost open scope, if any.
    #[must_use]
    pub fn current(&self) -> Option<TransactionContext> {
        let chain = self.existing_chain()?;
        let guard = chain.lock();
        guard
            .stack
            .last()
            .map(|scope| TransactionContext::new(scope.id, scope.parent))
    }

    /// Number of scopes open on the calling thread.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.existing_chain()
            .map_or(0, |chain| chain.lock().stack.len())
    }

    fn chain_for_current_thread(&self) -> Arc<Mutex<Chain>> {
        let thread = thread::current().id();
        if let Some(chain) = self.chains.read().get(&thread) {
            return Arc::clone(chain);
        }
        Arc::clone(self.chains.write().entry(thread).or_default())
    }

    fn existing_chain(&self) -> Option<Arc<Mutex<Chain>>> {
        self.chains.read().get(&thread::current().id()).cloned()
    }

    fn drop_chain(&self) {
        self.chains.write().remove(&thread::current().id());
    }

    fn pop_innermost(chain: &mut Chain, ctx: &TransactionContext) -> Result<Scope, Error> {
        match chain.stack.pop() {
            Some(scope) if scope.id == ctx.id() => Ok(scope),
            Some(scope) => {
                chain.stack.push(scope);
                Err(Self::closed_or_not_active(chain, ctx))
            }
            None => Err(Self::closed_or_not_active(chain, ctx)),
        }
    }

    fn closed_or_not_active(chain: &Chain, ctx: &TransactionContext) -> Error {
        chain
            .closed
            .get(&ctx.id())
            .map_or(Error::NotActive(ctx.id()), |state| {
                Error::AlreadyClosed(ctx.id(), *state)
            })
    }
}
