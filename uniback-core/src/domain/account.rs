//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Account class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Debit,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Debit => "debit",
            AccountType::Credit => "credit",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(AccountType::Debit),
            "credit" => Ok(AccountType::Credit),
            other => Err(Error::validation(format!("unknown account type '{}'", other))),
        }
    }
}

/// Account lifecycle status. Accounts are never deleted, only closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Whether an account may move from `self` to `next`
    ///
    /// Closed is terminal; active and frozen can switch back and forth.
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        match (self, next) {
            (AccountStatus::Closed, _) => false,
            (current, next) => *current != next,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(Error::validation(format!("unknown account status '{}'", other))),
        }
    }
}

/// A bank account owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Externally visible account number, unique across the ledger
    pub number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: AccountStatus,
}

impl Account {
    /// Open a new, empty, active account
    pub fn open(user_id: Uuid, number: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            number: number.into(),
            account_type,
            balance: Decimal::ZERO,
            opened_at: Utc::now(),
            status: AccountStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Fail with `InactiveAccount` unless the account is active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::InactiveAccount(self.number.clone()))
        }
    }

    pub fn view(&self) -> AccountView {
        AccountView::from(self)
    }
}

/// Public account representation (no internal ids)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub opening_date: DateTime<Utc>,
    pub status: AccountStatus,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            account_number: account.number.clone(),
            account_type: account.account_type,
            balance: account.balance,
            opening_date: account.opened_at,
            status: account.status,
        }
    }
}

/// All accounts of one owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsView {
    pub accounts_num: usize,
    pub accounts: Vec<AccountView>,
}

impl AccountsView {
    pub fn new(accounts: &[Account]) -> Self {
        Self {
            accounts_num: accounts.len(),
            accounts: accounts.iter().map(AccountView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_account_is_active_and_empty() {
        let account = Account::open(Uuid::new_v4(), "4081781012345678901234", AccountType::Debit);
        assert!(account.is_active());
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(account.ensure_active().is_ok());
    }

    #[test]
    fn test_inactive_account_is_rejected() {
        let mut account = Account::open(Uuid::new_v4(), "4081781012345678901234", AccountType::Credit);
        account.status = AccountStatus::Frozen;
        assert!(matches!(account.ensure_active(), Err(Error::InactiveAccount(n)) if n == account.number));
    }

    #[test]
    fn test_status_transitions() {
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::Frozen));
        assert!(AccountStatus::Frozen.can_transition_to(AccountStatus::Active));
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::Closed));
        assert!(!AccountStatus::Closed.can_transition_to(AccountStatus::Active));
        assert!(!AccountStatus::Active.can_transition_to(AccountStatus::Active));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(" Debit ".parse::<AccountType>().unwrap(), AccountType::Debit);
        assert_eq!("FROZEN".parse::<AccountStatus>().unwrap(), AccountStatus::Frozen);
        assert!("savings".parse::<AccountType>().is_err());
    }
}
