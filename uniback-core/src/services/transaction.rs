//! Transaction service - deposits, withdrawals and transfers

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{
    validate_amount, Account, SingleEntry, Transaction, TransactionKind, TransferEntry, TransferLink,
};
use crate::ports::{CallContext, LedgerStore};

/// Applies money movements to accounts
///
/// Holds no mutable state: the fee is fixed at construction and every write
/// goes through the store as one atomic unit. The checks here reject early;
/// the store repeats the status and funds checks inside its transaction.
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    fee: Decimal,
}

impl TransactionService {
    pub fn new(store: Arc<dyn LedgerStore>, fee: Decimal) -> Self {
        Self { store, fee }
    }

    pub fn fee(&self) -> Decimal {
        self.fee
    }

    /// Credit `amount - fee` to the account
    pub fn deposit(&self, ctx: &CallContext, account: &Account, amount: Decimal) -> Result<Account> {
        let amount = validate_amount(amount)?;
        account.ensure_active()?;

        let net = amount - self.fee;
        if net <= Decimal::ZERO {
            warn!(account = %account.number, "deposit does not cover the fee");
            return Err(Error::InsufficientNet { amount, fee: self.fee });
        }

        let entry = SingleEntry {
            transaction: Transaction::new(account.id, TransactionKind::Deposit, amount, self.fee),
            delta: net,
        };
        let updated = self.store.apply_single_entry(ctx, account.id, &entry)?;
        info!(account = %account.number, transaction = %entry.transaction.id, "deposit applied");
        Ok(updated)
    }

    /// Debit `amount + fee` from the account
    pub fn withdraw(&self, ctx: &CallContext, account: &Account, amount: Decimal) -> Result<Account> {
        let amount = validate_amount(amount)?;
        account.ensure_active()?;

        let required = amount + self.fee;
        if account.balance - required < Decimal::ZERO {
            warn!(account = %account.number, "withdrawal exceeds balance");
            return Err(Error::InsufficientFunds {
                balance: account.balance,
                required,
            });
        }

        let entry = SingleEntry {
            transaction: Transaction::new(account.id, TransactionKind::Withdrawal, amount, self.fee),
            delta: -required,
        };
        let updated = self.store.apply_single_entry(ctx, account.id, &entry)?;
        info!(account = %account.number, transaction = %entry.transaction.id, "withdrawal applied");
        Ok(updated)
    }

    /// Move `amount` from `source` to `destination`; the fee is charged to the source
    ///
    /// Returns the refreshed source account.
    pub fn transfer(
        &self,
        ctx: &CallContext,
        source: &Account,
        destination: &Account,
        amount: Decimal,
    ) -> Result<Account> {
        let amount = validate_amount(amount)?;
        if source.id == destination.id {
            return Err(Error::validation("cannot transfer to the same account"));
        }
        source.ensure_active()?;
        destination.ensure_active()?;

        let debit = amount + self.fee;
        if source.balance - debit < Decimal::ZERO {
            warn!(account = %source.number, "transfer exceeds balance");
            return Err(Error::InsufficientFunds {
                balance: source.balance,
                required: debit,
            });
        }

        let transaction = Transaction::new(source.id, TransactionKind::Transfer, amount, self.fee);
        let entry = TransferEntry {
            link: TransferLink::new(transaction.id, destination.id),
            transaction,
            debit,
            credit: amount,
        };
        let updated = self.store.apply_transfer(ctx, source.id, destination.id, &entry)?;
        info!(
            source = %source.number,
            destination = %destination.number,
            transaction = %entry.transaction.id,
            "transfer applied"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::{AccountStatus, AccountType};
    use uuid::Uuid;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn setup(fee: Decimal) -> (Arc<InMemoryLedgerStore>, TransactionService) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let service = TransactionService::new(store.clone(), fee);
        (store, service)
    }

    fn account(store: &InMemoryLedgerStore, number: &str, balance: i64) -> Account {
        let mut account = Account::open(Uuid::new_v4(), number, AccountType::Debit);
        account.balance = dec(balance);
        store.insert_account(&CallContext::background(), &account).unwrap();
        account
    }

    #[test]
    fn test_deposit_adds_amount() {
        let (store, service) = setup(Decimal::ZERO);
        let acc = account(&store, "4081781000000000000001", 100);

        let updated = service.deposit(&CallContext::background(), &acc, dec(50)).unwrap();

        assert_eq!(updated.balance, dec(150));
        let txs = store.get_transactions_by_account(&CallContext::background(), acc.id).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::Deposit);
        assert_eq!(txs[0].amount, dec(50));
    }

    #[test]
    fn test_deposit_must_cover_fee() {
        let (store, service) = setup(dec(1));
        let acc = account(&store, "4081781000000000000001", 0);

        let result = service.deposit(&CallContext::background(), &acc, dec(1));
        assert!(matches!(result, Err(Error::InsufficientNet { .. })));
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn test_deposit_net_of_fee() {
        let (store, service) = setup(Decimal::new(50, 2));
        let acc = account(&store, "4081781000000000000001", 0);

        let updated = service.deposit(&CallContext::background(), &acc, dec(10)).unwrap();
        assert_eq!(updated.balance, Decimal::new(950, 2));
    }

    #[test]
    fn test_withdraw_more_than_balance() {
        let (store, service) = setup(Decimal::ZERO);
        let acc = account(&store, "4081781000000000000001", 100);

        let result = service.withdraw(&CallContext::background(), &acc, dec(150));
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        let loaded = store.get_account_by_id(&CallContext::background(), acc.id).unwrap().unwrap();
        assert_eq!(loaded.balance, dec(100));
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn test_withdraw_counts_fee() {
        let (store, service) = setup(dec(1));
        let acc = account(&store, "4081781000000000000001", 100);

        assert!(matches!(
            service.withdraw(&CallContext::background(), &acc, dec(100)),
            Err(Error::InsufficientFunds { .. })
        ));
        let updated = service.withdraw(&CallContext::background(), &acc, dec(99)).unwrap();
        assert_eq!(updated.balance, Decimal::ZERO);
    }

    #[test]
    fn test_transfer_moves_money_and_links() {
        let (store, service) = setup(Decimal::ZERO);
        let ctx = CallContext::background();
        let source = account(&store, "4081781000000000000001", 100);
        let destination = account(&store, "4081781000000000000002", 0);

        let updated = service.transfer(&ctx, &source, &destination, dec(40)).unwrap();

        assert_eq!(updated.balance, dec(60));
        let destination = store.get_account_by_id(&ctx, destination.id).unwrap().unwrap();
        assert_eq!(destination.balance, dec(40));

        let txs = store.get_transactions_by_account(&ctx, source.id).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TransactionKind::Transfer);
        let link = store.get_transfer_link(&ctx, txs[0].id).unwrap().unwrap();
        assert_eq!(link.destination_account_id, destination.id);
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_transfer_rejections() {
        let (store, service) = setup(Decimal::ZERO);
        let ctx = CallContext::background();
        let source = account(&store, "4081781000000000000001", 100);
        let mut frozen = account(&store, "4081781000000000000002", 0);
        store.set_account_status(&ctx, frozen.id, AccountStatus::Frozen).unwrap();
        frozen.status = AccountStatus::Frozen;

        assert!(matches!(
            service.transfer(&ctx, &source, &source, dec(1)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.transfer(&ctx, &source, &frozen, dec(1)),
            Err(Error::InactiveAccount(_))
        ));
        assert!(matches!(
            service.transfer(&ctx, &source, &source.clone(), Decimal::new(1, 3)),
            Err(Error::Validation(_))
        ));
        assert_eq!(store.transaction_count(), 0);
    }

    #[test]
    fn test_inactive_account_rejected_for_deposit() {
        let (store, service) = setup(Decimal::ZERO);
        let mut acc = account(&store, "4081781000000000000001", 0);
        acc.status = AccountStatus::Frozen;
        assert!(matches!(
            service.deposit(&CallContext::background(), &acc, dec(5)),
            Err(Error::InactiveAccount(_))
        ));
    }

    #[test]
    fn test_store_failure_propagates_unchanged() {
        let (store, service) = setup(Decimal::ZERO);
        let acc = account(&store, "4081781000000000000001", 100);
        store.fail_writes(true);

        let result = service.withdraw(&CallContext::background(), &acc, dec(10));
        assert!(matches!(result, Err(Error::Persistence(_))));

        store.fail_writes(false);
        let loaded = store.get_account_by_id(&CallContext::background(), acc.id).unwrap().unwrap();
        assert_eq!(loaded.balance, dec(100));
    }

    #[test]
    fn test_stale_snapshot_is_caught_by_store() {
        let (store, service) = setup(Decimal::ZERO);
        let ctx = CallContext::background();
        let acc = account(&store, "4081781000000000000001", 100);

        // both calls see the same 100 balance snapshot
        service.withdraw(&ctx, &acc, dec(60)).unwrap();
        let second = service.withdraw(&ctx, &acc, dec(60));

        assert!(matches!(second, Err(Error::InsufficientFunds { .. })));
        let loaded = store.get_account_by_id(&ctx, acc.id).unwrap().unwrap();
        assert_eq!(loaded.balance, dec(40));
    }
}
