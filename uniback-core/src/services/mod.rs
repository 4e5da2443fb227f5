//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod account;
mod card;
pub mod logging;
pub mod migration;
mod transaction;
mod uniqueness;
mod user;

pub use account::AccountService;
pub use card::{CardService, NumberSource};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use transaction::TransactionService;
pub use uniqueness::UniquenessGuard;
pub use user::UserService;
