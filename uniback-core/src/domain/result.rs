//! Result and error types for the core library

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Business-rule rejections are recoverable and belong to the caller;
/// everything else is a fault on our side. See [`Error::class`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("Insufficient net amount: amount {amount} does not cover fee {fee}")]
    InsufficientNet { amount: Decimal, fee: Decimal },

    #[error("Account is not active: {0}")]
    InactiveAccount(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("Could not find a free {kind} after {attempts} attempts")]
    IdentifierSpaceExhausted { kind: &'static str, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a front end should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// The caller's request was refused (4xx)
    Rejected,
    /// Something failed on our side (5xx)
    Fault,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Rejected => "rejected",
            ErrorClass::Fault => "fault",
        }
    }
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_)
            | Self::InsufficientFunds { .. }
            | Self::InsufficientNet { .. }
            | Self::InactiveAccount(_)
            | Self::NotFound(_) => ErrorClass::Rejected,
            _ => ErrorClass::Fault,
        }
    }

    /// Stable, data-free identifier of the variant
    ///
    /// Safe to persist where the Display text is not: messages can carry
    /// balances, amounts or user-entered contact details.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InsufficientNet { .. } => "insufficient_net",
            Self::InactiveAccount(_) => "inactive_account",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Crypto(_) => "crypto",
            Self::IdentifierSpaceExhausted { .. } => "identifier_space_exhausted",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.class() == ErrorClass::Rejected
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_class: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_class: None,
            context: None,
        }
    }

    /// Attach context to the result
    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = Some(context);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let class = e.class();
                let mut failed = Self::fail(e.to_string());
                failed.error_class = Some(class);
                failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result_keeps_error_class() {
        let err: Result<i32> = Err(Error::InsufficientFunds {
            balance: Decimal::new(100, 0),
            required: Decimal::new(150, 0),
        });
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert_eq!(result.error_class, Some(ErrorClass::Rejected));
        assert!(result.error.unwrap().contains("Insufficient funds"));

        let err: Result<i32> = Err(Error::persistence("disk full"));
        let result: OperationResult<i32> = err.into();
        assert_eq!(result.error_class, Some(ErrorClass::Fault));
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::validation("bad amount").is_rejection());
        assert!(Error::InactiveAccount("123".into()).is_rejection());
        assert!(Error::not_found("account").is_rejection());
        assert!(!Error::crypto("bad key").is_rejection());
        assert!(!Error::Cancelled.is_rejection());
        assert!(!Error::IdentifierSpaceExhausted { kind: "card number", attempts: 3 }.is_rejection());
    }

    #[test]
    fn test_code_carries_no_data() {
        let err = Error::InsufficientFunds {
            balance: Decimal::new(12345, 2),
            required: Decimal::new(50000, 2),
        };
        assert_eq!(err.code(), "insufficient_funds");
        assert!(!err.code().chars().any(|c| c.is_ascii_digit()));

        let err = Error::validation("invalid phone '+1 415 555 0123'");
        assert_eq!(err.code(), "validation");
        assert_eq!(ErrorClass::Rejected.as_str(), "rejected");
    }
}
