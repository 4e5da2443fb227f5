//! Uniback Core - ledger, secure identifiers and card protection
//!
//! This crate implements the banking core following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, Card, User) and
//!   identifier generation
//! - **ports**: Trait definitions for external dependencies (LedgerStore,
//!   FieldProtector) and the per-call context
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, in-memory, sealed box)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use adapters::duckdb::DuckDbLedgerStore;
use adapters::sealed_box::SealedBoxProtector;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{
    Account, AccountStatus, AccountType, AccountView, AccountsView, Card, CardView, NewUser, Transaction,
    TransactionKind, TransactionView, User,
};
pub use domain::result::{Error, ErrorClass, OperationResult};
pub use ports::{CallContext, CancelHandle, FieldProtector, LedgerStore};
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};

/// Main context for Uniback operations
///
/// Holds the store, the field protector and every service, wired from one
/// data directory. Nothing here is global; front ends create one context and
/// share it.
pub struct UnibackContext {
    pub config: Config,
    pub store: Arc<DuckDbLedgerStore>,
    pub protector: Arc<SealedBoxProtector>,
    pub user_service: UserService,
    pub account_service: AccountService,
    pub transaction_service: TransactionService,
    pub card_service: CardService,
}

impl UnibackContext {
    /// Load config, provision keys, open the ledger and run migrations
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;
        Self::with_config(data_dir, config)
    }

    /// Same as [`UnibackContext::new`] with an explicit config
    pub fn with_config(data_dir: &Path, config: Config) -> Result<Self> {
        let protector = Arc::new(
            SealedBoxProtector::open_or_provision(&config.public_key_path, &config.private_key_path)
                .context("Failed to load field protection keys")?,
        );

        let db_path = data_dir.join("uniback.duckdb");
        let store = Arc::new(DuckDbLedgerStore::new(&db_path)?);
        store.ensure_schema().context("Failed to migrate ledger database")?;
        debug!(path = %db_path.display(), "ledger opened");

        let guard = UniquenessGuard::new(config.max_identifier_attempts);
        let ledger: Arc<dyn LedgerStore> = store.clone();

        let user_service = UserService::new(Arc::clone(&ledger));
        let account_service = AccountService::new(Arc::clone(&ledger), guard);
        let transaction_service = TransactionService::new(Arc::clone(&ledger), config.fee);
        let card_service = CardService::new(Arc::clone(&ledger), protector.clone(), guard);

        Ok(Self {
            config,
            store,
            protector,
            user_service,
            account_service,
            transaction_service,
            card_service,
        })
    }

    /// Fresh call context bounded by the configured timeout
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.config.timeout)
    }
}
