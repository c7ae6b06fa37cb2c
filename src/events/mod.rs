//! Events Module
//!
//! Change records, the transaction aggregator, and listener management.
//!
//! Every cache mutation runs inside a transaction on the shared event bus;
//! when the outermost transaction closes, all interested listeners receive
//! a single [`ChangeRecord`] covering everything that happened.

mod aggregator;
pub(crate) mod bus;
mod listeners;
mod record;

pub use listeners::{ChangedHandler, HandlerHandle};
pub use record::{ChangeItem, ChangeKind, ChangeRecord, TypeChanges};
