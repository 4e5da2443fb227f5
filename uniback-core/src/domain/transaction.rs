//! Transaction domain model
//!
//! Transactions are append-only ledger entries. A transfer is recorded once,
//! against the source account, and tied to its destination by a
//! [`TransferLink`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Largest amount accepted for a single movement
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Amounts carry at most this many fractional digits
pub const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(Error::persistence(format!("unknown transaction kind '{}'", other))),
        }
    }
}

/// A single money movement recorded against one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(account_id: Uuid, kind: TransactionKind, amount: Decimal, fee: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            fee,
            created_at: Utc::now(),
        }
    }
}

/// Second leg of a transfer: which account received the money
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLink {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub destination_account_id: Uuid,
}

impl TransferLink {
    pub fn new(transaction_id: Uuid, destination_account_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            destination_account_id,
        }
    }
}

/// Balance change plus transaction record for a deposit or withdrawal
///
/// `delta` is signed: positive credits the account, negative debits it.
#[derive(Debug, Clone)]
pub struct SingleEntry {
    pub transaction: Transaction,
    pub delta: Decimal,
}

/// Everything a transfer writes, persisted as one unit
#[derive(Debug, Clone)]
pub struct TransferEntry {
    pub transaction: Transaction,
    pub link: TransferLink,
    /// Taken from the source (amount + fee)
    pub debit: Decimal,
    /// Given to the destination (amount)
    pub credit: Decimal,
}

/// Transaction as shown in an account history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
    /// Destination account number, transfers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

/// Check that an amount is positive, within range and has at most two decimals
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation(format!("amount must be positive, got {}", amount)));
    }
    if amount > MAX_AMOUNT {
        return Err(Error::validation(format!("amount {} exceeds the limit of {}", amount, MAX_AMOUNT)));
    }
    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(Error::validation(format!(
            "amount {} has more than {} decimal places",
            amount, AMOUNT_SCALE
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount_accepts_cents() {
        assert_eq!(validate_amount(Decimal::new(1050, 2)).unwrap(), Decimal::new(105, 1));
        // trailing zeros beyond the scale are fine once normalized
        assert!(validate_amount(Decimal::new(10_000, 3)).is_ok());
    }

    #[test]
    fn test_validate_amount_rejects_bad_values() {
        assert!(matches!(validate_amount(Decimal::ZERO), Err(Error::Validation(_))));
        assert!(matches!(validate_amount(Decimal::new(-5, 0)), Err(Error::Validation(_))));
        assert!(matches!(validate_amount(Decimal::new(1001, 3)), Err(Error::Validation(_))));
        assert!(matches!(
            validate_amount(MAX_AMOUNT + Decimal::ONE),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [TransactionKind::Deposit, TransactionKind::Withdrawal, TransactionKind::Transfer] {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
    }
}
