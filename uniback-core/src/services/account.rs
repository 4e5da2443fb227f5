//! Account service - opening, listing and lifecycle of accounts

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::identifier::generate_account_number;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountStatus, AccountType, AccountView, AccountsView, TransactionKind, TransactionView, User,
};
use crate::ports::{CallContext, LedgerStore};
use crate::services::UniquenessGuard;

pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    guard: UniquenessGuard,
}

impl AccountService {
    pub fn new(store: Arc<dyn LedgerStore>, guard: UniquenessGuard) -> Self {
        Self { store, guard }
    }

    /// Open an empty, active account with a fresh number for `username`
    pub fn open_account(&self, ctx: &CallContext, username: &str, account_type: AccountType) -> Result<AccountView> {
        let owner = self.owner(ctx, username)?;
        let number = self.guard.acquire(
            "account number",
            || Ok(generate_account_number()),
            |candidate| self.store.account_number_exists(ctx, candidate),
        )?;

        let account = Account::open(owner.id, number, account_type);
        self.store.insert_account(ctx, &account)?;
        info!(account = %account.number, kind = %account_type, "account opened");
        Ok(account.view())
    }

    pub fn list_accounts(&self, ctx: &CallContext, username: &str) -> Result<AccountsView> {
        let owner = self.owner(ctx, username)?;
        let accounts = self.store.get_accounts_by_owner(ctx, owner.id)?;
        Ok(AccountsView::new(&accounts))
    }

    /// Account `number` if it belongs to `username`
    ///
    /// Someone else's account is reported exactly like a missing one.
    pub fn get_owned_account(&self, ctx: &CallContext, username: &str, number: &str) -> Result<Account> {
        owned_account(self.store.as_ref(), ctx, username, number)
    }

    /// Any account by number, e.g. a transfer destination
    pub fn get_account_by_number(&self, ctx: &CallContext, number: &str) -> Result<Account> {
        self.store
            .get_account_by_number(ctx, number)?
            .ok_or_else(|| Error::not_found(format!("account {}", number)))
    }

    /// Move an owned account to `status`
    ///
    /// Active and frozen switch freely; closed is terminal and needs a zero balance.
    pub fn change_status(
        &self,
        ctx: &CallContext,
        username: &str,
        number: &str,
        status: AccountStatus,
    ) -> Result<AccountView> {
        let account = self.get_owned_account(ctx, username, number)?;
        if !account.status.can_transition_to(status) {
            return Err(Error::validation(format!(
                "account {} cannot go from {} to {}",
                account.number, account.status, status
            )));
        }
        self.store.set_account_status(ctx, account.id, status)?;
        info!(account = %account.number, from = %account.status, to = %status, "account status changed");

        let updated = self
            .store
            .get_account_by_id(ctx, account.id)?
            .ok_or_else(|| Error::not_found(format!("account {}", number)))?;
        Ok(updated.view())
    }

    /// Transactions of an owned account, newest first, with transfer destinations
    pub fn history(&self, ctx: &CallContext, username: &str, number: &str) -> Result<Vec<TransactionView>> {
        let account = self.get_owned_account(ctx, username, number)?;
        let transactions = self.store.get_transactions_by_account(ctx, account.id)?;

        let mut destinations: HashMap<Uuid, String> = HashMap::new();
        let mut views = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let destination = if tx.kind == TransactionKind::Transfer {
                match self.store.get_transfer_link(ctx, tx.id)? {
                    Some(link) => Some(self.destination_number(ctx, link.destination_account_id, &mut destinations)?),
                    None => None,
                }
            } else {
                None
            };
            views.push(TransactionView {
                id: tx.id,
                kind: tx.kind,
                amount: tx.amount,
                fee: tx.fee,
                time: tx.created_at,
                destination,
            });
        }
        Ok(views)
    }

    fn destination_number(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        cache: &mut HashMap<Uuid, String>,
    ) -> Result<String> {
        if let Some(number) = cache.get(&account_id) {
            return Ok(number.clone());
        }
        let number = self
            .store
            .get_account_by_id(ctx, account_id)?
            .map(|a| a.number)
            .ok_or_else(|| Error::persistence(format!("transfer destination {} is missing", account_id)))?;
        cache.insert(account_id, number.clone());
        Ok(number)
    }

    fn owner(&self, ctx: &CallContext, username: &str) -> Result<User> {
        owner(self.store.as_ref(), ctx, username)
    }
}

pub(crate) fn owner(store: &dyn LedgerStore, ctx: &CallContext, username: &str) -> Result<User> {
    store
        .get_user_by_username(ctx, username)?
        .ok_or_else(|| Error::not_found(format!("user {}", username)))
}

pub(crate) fn owned_account(store: &dyn LedgerStore, ctx: &CallContext, username: &str, number: &str) -> Result<Account> {
    let user = owner(store, ctx, username)?;
    store
        .get_account_for_owner(ctx, user.id, number)?
        .ok_or_else(|| Error::not_found(format!("account {}", number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::identifier::is_valid_account_number;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn setup() -> (Arc<InMemoryLedgerStore>, AccountService) {
        let store = Arc::new(InMemoryLedgerStore::new());
        for name in ["alice", "bob"] {
            let user = User {
                id: Uuid::new_v4(),
                username: name.to_string(),
                password_hash: "hash".to_string(),
                email: format!("{}@example.com", name),
                phone: None,
                created_at: Utc::now(),
            };
            store.create_user(&CallContext::background(), &user).unwrap();
        }
        let service = AccountService::new(store.clone(), UniquenessGuard::new(Some(100)));
        (store, service)
    }

    #[test]
    fn test_open_account() {
        let (_store, service) = setup();
        let ctx = CallContext::background();

        let view = service.open_account(&ctx, "alice", AccountType::Credit).unwrap();

        assert!(is_valid_account_number(&view.account_number));
        assert_eq!(view.balance, Decimal::ZERO);
        assert_eq!(view.status, AccountStatus::Active);
        assert_eq!(view.account_type, AccountType::Credit);

        let listed = service.list_accounts(&ctx, "alice").unwrap();
        assert_eq!(listed.accounts_num, 1);
        assert_eq!(listed.accounts[0].account_number, view.account_number);
    }

    #[test]
    fn test_unknown_user_cannot_open() {
        let (_store, service) = setup();
        let result = service.open_account(&CallContext::background(), "mallory", AccountType::Debit);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_foreign_account_is_not_found() {
        let (_store, service) = setup();
        let ctx = CallContext::background();
        let view = service.open_account(&ctx, "alice", AccountType::Debit).unwrap();

        assert!(service.get_owned_account(&ctx, "alice", &view.account_number).is_ok());
        assert!(matches!(
            service.get_owned_account(&ctx, "bob", &view.account_number),
            Err(Error::NotFound(_))
        ));
        assert!(service.get_account_by_number(&ctx, &view.account_number).is_ok());
    }

    #[test]
    fn test_status_lifecycle() {
        let (_store, service) = setup();
        let ctx = CallContext::background();
        let number = service.open_account(&ctx, "alice", AccountType::Debit).unwrap().account_number;

        let frozen = service.change_status(&ctx, "alice", &number, AccountStatus::Frozen).unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);
        assert!(matches!(
            service.change_status(&ctx, "alice", &number, AccountStatus::Frozen),
            Err(Error::Validation(_))
        ));

        service.change_status(&ctx, "alice", &number, AccountStatus::Closed).unwrap();
        assert!(matches!(
            service.change_status(&ctx, "alice", &number, AccountStatus::Active),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_exhausted_number_space() {
        let (store, _) = setup();
        let service = AccountService::new(store, UniquenessGuard::new(Some(0)));
        // a ceiling of zero attempts never generates anything
        let result = service.open_account(&CallContext::background(), "alice", AccountType::Debit);
        assert!(matches!(result, Err(Error::IdentifierSpaceExhausted { .. })));
    }
}
