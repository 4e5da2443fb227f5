//! In-memory ledger store
//!
//! Same contract as the DuckDB store, kept in a single mutex-guarded state.
//! Used as the fake behind service tests; [`InMemoryLedgerStore::fail_writes`]
//! makes the next ledger write fail after partially staging its changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountStatus, Card, SingleEntry, Transaction, TransferEntry, TransferLink, User,
};
use crate::ports::{CallContext, LedgerStore};

#[derive(Debug, Default, Clone)]
struct State {
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    links: Vec<TransferLink>,
    cards: Vec<Card>,
}

impl State {
    /// Same checks as the guarded SQL update
    fn apply_delta(&mut self, account_id: Uuid, delta: Decimal) -> Result<()> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| Error::not_found(format!("account {}", account_id)))?;
        account.ensure_active()?;
        if account.balance + delta < Decimal::ZERO {
            return Err(Error::InsufficientFunds {
                balance: account.balance,
                required: -delta,
            });
        }
        account.balance += delta;
        Ok(())
    }
}

/// [`LedgerStore`] backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    fingerprint_lookups: AtomicUsize,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make ledger writes fail with a persistence error until reset
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().map(|s| s.transactions.len()).unwrap_or(0)
    }

    /// How many card fingerprint existence checks have been made
    pub fn fingerprint_lookups(&self) -> usize {
        self.fingerprint_lookups.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.lock().map(|s| s.links.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::persistence(format!("Lock poisoned: {}", e)))
    }

    /// Run `write` against a scratch copy and publish it only on success
    fn atomically<T>(&self, ctx: &CallContext, write: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        ctx.check()?;
        let mut state = self.lock()?;
        let mut staged = state.clone();
        let value = write(&mut staged)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("injected write failure"));
        }
        ctx.check()?;
        *state = staged;
        Ok(value)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_user(&self, ctx: &CallContext, user: &User) -> Result<()> {
        self.atomically(ctx, |state| {
            state.users.insert(user.id, user.clone());
            Ok(())
        })
    }

    fn get_user_by_username(&self, ctx: &CallContext, username: &str) -> Result<Option<User>> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    fn find_taken_user_field(
        &self,
        ctx: &CallContext,
        username: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<&'static str>> {
        ctx.check()?;
        let state = self.lock()?;
        let users = || state.users.values();
        if users().any(|u| u.username == username) {
            return Ok(Some("username"));
        }
        if users().any(|u| u.email == email) {
            return Ok(Some("email"));
        }
        if phone.is_some() && users().any(|u| u.phone.as_deref() == phone) {
            return Ok(Some("phone"));
        }
        Ok(None)
    }

    fn account_number_exists(&self, ctx: &CallContext, number: &str) -> Result<bool> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.accounts.values().any(|a| a.number == number))
    }

    fn insert_account(&self, ctx: &CallContext, account: &Account) -> Result<()> {
        self.atomically(ctx, |state| {
            if state.accounts.values().any(|a| a.number == account.number) {
                return Err(Error::persistence(format!("duplicate account number {}", account.number)));
            }
            state.accounts.insert(account.id, account.clone());
            Ok(())
        })
    }

    fn get_account_by_number(&self, ctx: &CallContext, number: &str) -> Result<Option<Account>> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.accounts.values().find(|a| a.number == number).cloned())
    }

    fn get_account_for_owner(&self, ctx: &CallContext, user_id: Uuid, number: &str) -> Result<Option<Account>> {
        Ok(self
            .get_account_by_number(ctx, number)?
            .filter(|a| a.user_id == user_id))
    }

    fn get_accounts_by_owner(&self, ctx: &CallContext, user_id: Uuid) -> Result<Vec<Account>> {
        ctx.check()?;
        let state = self.lock()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.number.cmp(&b.number)));
        Ok(accounts)
    }

    fn set_account_status(&self, ctx: &CallContext, account_id: Uuid, status: AccountStatus) -> Result<()> {
        self.atomically(ctx, |state| {
            let account = state
                .accounts
                .get_mut(&account_id)
                .ok_or_else(|| Error::not_found(format!("account {}", account_id)))?;
            if !account.status.can_transition_to(status) {
                return Err(Error::validation(format!(
                    "account {} cannot go from {} to {}",
                    account.number, account.status, status
                )));
            }
            if status == AccountStatus::Closed && !account.balance.is_zero() {
                return Err(Error::validation(format!(
                    "account {} still holds {} and cannot be closed",
                    account.number, account.balance
                )));
            }
            account.status = status;
            Ok(())
        })
    }

    fn apply_single_entry(&self, ctx: &CallContext, account_id: Uuid, entry: &SingleEntry) -> Result<Account> {
        self.atomically(ctx, |state| {
            state.apply_delta(account_id, entry.delta)?;
            state.transactions.push(entry.transaction.clone());
            Ok(state.accounts[&account_id].clone())
        })
    }

    fn apply_transfer(
        &self,
        ctx: &CallContext,
        source_id: Uuid,
        destination_id: Uuid,
        entry: &TransferEntry,
    ) -> Result<Account> {
        self.atomically(ctx, |state| {
            state.apply_delta(source_id, -entry.debit)?;
            state.apply_delta(destination_id, entry.credit)?;
            state.transactions.push(entry.transaction.clone());
            state.links.push(entry.link.clone());
            Ok(state.accounts[&source_id].clone())
        })
    }

    fn get_transactions_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Transaction>> {
        ctx.check()?;
        let state = self.lock()?;
        let mut txs: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    fn get_transfer_link(&self, ctx: &CallContext, transaction_id: Uuid) -> Result<Option<TransferLink>> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.links.iter().find(|l| l.transaction_id == transaction_id).cloned())
    }

    fn get_account_by_id(&self, ctx: &CallContext, account_id: Uuid) -> Result<Option<Account>> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.accounts.get(&account_id).cloned())
    }

    fn card_ciphertext_exists(&self, ctx: &CallContext, number_ciphertext: &[u8]) -> Result<bool> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.cards.iter().any(|c| c.number == number_ciphertext))
    }

    fn card_fingerprint_exists(&self, ctx: &CallContext, fingerprint: &str) -> Result<bool> {
        ctx.check()?;
        self.fingerprint_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.lock()?;
        Ok(state.cards.iter().any(|c| c.number_fingerprint == fingerprint))
    }

    fn insert_card(&self, ctx: &CallContext, card: &Card) -> Result<()> {
        self.atomically(ctx, |state| {
            if state.cards.iter().any(|c| c.number_fingerprint == card.number_fingerprint) {
                return Err(Error::persistence("duplicate card fingerprint"));
            }
            state.cards.push(card.clone());
            Ok(())
        })
    }

    fn get_cards_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Card>> {
        ctx.check()?;
        let state = self.lock()?;
        Ok(state.cards.iter().filter(|c| c.account_id == account_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountType, TransactionKind};

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let store = InMemoryLedgerStore::new();
        let ctx = CallContext::background();
        let account = Account::open(Uuid::new_v4(), "4081781000000000000001", AccountType::Debit);
        store.insert_account(&ctx, &account).unwrap();

        store.fail_writes(true);
        let entry = SingleEntry {
            transaction: Transaction::new(account.id, TransactionKind::Deposit, Decimal::TEN, Decimal::ZERO),
            delta: Decimal::TEN,
        };
        assert!(matches!(
            store.apply_single_entry(&ctx, account.id, &entry),
            Err(Error::Persistence(_))
        ));

        let loaded = store.get_account_by_id(&ctx, account.id).unwrap().unwrap();
        assert_eq!(loaded.balance, Decimal::ZERO);
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn test_find_taken_user_field() {
        let store = InMemoryLedgerStore::new();
        let ctx = CallContext::background();
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "hash".into(),
            email: "alice@example.com".into(),
            phone: Some("+14155550123".into()),
            created_at: chrono::Utc::now(),
        };
        store.create_user(&ctx, &user).unwrap();

        let taken = |u: &str, e: &str, p: Option<&str>| store.find_taken_user_field(&ctx, u, e, p).unwrap();
        assert_eq!(taken("alice", "x@example.com", None), Some("username"));
        assert_eq!(taken("bob", "alice@example.com", None), Some("email"));
        assert_eq!(taken("bob", "bob@example.com", Some("+14155550123")), Some("phone"));
        assert_eq!(taken("bob", "bob@example.com", None), None);
    }
}
