//! Ledger store port - persistence abstraction

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, AccountStatus, Card, SingleEntry, Transaction, TransferEntry, TransferLink, User};

use super::CallContext;

/// Durable storage for users, accounts, ledger entries and cards
///
/// Every method takes the caller's [`CallContext`]. Multi-row writes are
/// all-or-nothing: on any failure, cancellation or expired deadline nothing
/// is left behind.
pub trait LedgerStore: Send + Sync {
    // === Users ===

    fn create_user(&self, ctx: &CallContext, user: &User) -> Result<()>;

    fn get_user_by_username(&self, ctx: &CallContext, username: &str) -> Result<Option<User>>;

    /// Name of the first field already taken by another user, if any
    fn find_taken_user_field(
        &self,
        ctx: &CallContext,
        username: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<&'static str>>;

    // === Accounts ===

    fn account_number_exists(&self, ctx: &CallContext, number: &str) -> Result<bool>;

    fn insert_account(&self, ctx: &CallContext, account: &Account) -> Result<()>;

    fn get_account_by_number(&self, ctx: &CallContext, number: &str) -> Result<Option<Account>>;

    /// Account by number, only if owned by `user_id`
    fn get_account_for_owner(
        &self,
        ctx: &CallContext,
        user_id: Uuid,
        number: &str,
    ) -> Result<Option<Account>>;

    fn get_accounts_by_owner(&self, ctx: &CallContext, user_id: Uuid) -> Result<Vec<Account>>;

    fn set_account_status(&self, ctx: &CallContext, account_id: Uuid, status: AccountStatus) -> Result<()>;

    // === Ledger writes ===

    /// Apply a deposit or withdrawal to `account_id`
    ///
    /// The account must be active and its balance must stay non-negative;
    /// the store re-checks both inside its own transaction. Returns the
    /// account as it is after the write.
    fn apply_single_entry(&self, ctx: &CallContext, account_id: Uuid, entry: &SingleEntry) -> Result<Account>;

    /// Debit the source, credit the destination, record the transaction and
    /// its link. Returns the refreshed source account.
    fn apply_transfer(
        &self,
        ctx: &CallContext,
        source_id: Uuid,
        destination_id: Uuid,
        entry: &TransferEntry,
    ) -> Result<Account>;

    // === History ===

    /// Transactions recorded against `account_id`, newest first
    fn get_transactions_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Transaction>>;

    fn get_transfer_link(&self, ctx: &CallContext, transaction_id: Uuid) -> Result<Option<TransferLink>>;

    fn get_account_by_id(&self, ctx: &CallContext, account_id: Uuid) -> Result<Option<Account>>;

    // === Cards ===

    fn card_ciphertext_exists(&self, ctx: &CallContext, number_ciphertext: &[u8]) -> Result<bool>;

    fn card_fingerprint_exists(&self, ctx: &CallContext, fingerprint: &str) -> Result<bool>;

    fn insert_card(&self, ctx: &CallContext, card: &Card) -> Result<()>;

    fn get_cards_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Card>>;
}
