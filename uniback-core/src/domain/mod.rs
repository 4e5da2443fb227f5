//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies beyond the OS
//! random source used for identifiers.

mod account;
mod card;
pub mod identifier;
pub mod result;
mod transaction;
mod user;

pub use account::{Account, AccountStatus, AccountType, AccountView, AccountsView};
pub use card::{Card, CardView};
pub use result::{Error, ErrorClass, OperationResult, Result};
pub use transaction::{
    validate_amount, SingleEntry, Transaction, TransactionKind, TransactionView, TransferEntry,
    TransferLink, MAX_AMOUNT,
};
pub use user::{NewUser, User};
