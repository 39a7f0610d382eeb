//! Synchronous, transaction-aware event dispatch.
//!
//! Receivers run on the emitting thread, in registration order, inside the
//! emitter's active transaction scope. The emitter blocks until every
//! receiver has returned, and a rollback of the enclosing scope undoes the
//! emitter's writes and every receiver's writes together.
//!
//! Nothing here crosses a process or thread boundary: dispatch is a plain
//! call chain, and blocking is intentional and total.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bus;
mod dispatch;
mod error;
mod event;
mod receiver;
mod registry;

pub use bus::EventBus;
pub use dispatch::{DispatchResult, Dispatcher};
pub use error::Error;
pub use event::Event;
pub use receiver::Receiver;
pub use registry::{Registry, SubscriptionHandle};

pub use tandem_transaction::{TransactionContext, TransactionManager};
