//! Thread-scoped transaction contexts with undoable change logs.
//!
//! A [`TransactionManager`] keeps one independent stack of nested scopes per
//! thread. Collaborators register undo actions for every write they perform
//! while a scope is open; rolling the scope back replays those actions in
//! reverse insertion order. Committing a nested scope transfers its records
//! to the parent (savepoint semantics); committing the outermost scope
//! discards them, making every effect durable.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod changelog;
mod context;
mod error;
mod manager;

pub use changelog::{ChangeLog, ChangeRecord, UndoFn};
pub use context::{ScopeId, ScopeState, TransactionContext};
pub use error::Error;
pub use manager::TransactionManager;
