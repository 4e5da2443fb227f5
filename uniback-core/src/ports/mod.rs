//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod context;
mod field_protector;
mod ledger_store;

pub use context::{CallContext, CancelHandle};
pub use field_protector::FieldProtector;
pub use ledger_store::LedgerStore;
