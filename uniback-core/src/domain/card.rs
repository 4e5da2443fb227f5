//! Card domain model
//!
//! A stored card only ever holds sealed field values. Plaintext lives in
//! [`CardView`] and only for the duration of a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment card as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Sealed card number
    pub number: Vec<u8>,
    /// Sealed `MM/YY` expiry
    pub expiry: Vec<u8>,
    /// Sealed three-digit CVV
    pub cvv: Vec<u8>,
    /// Keyed hash of the plaintext number, used for uniqueness only
    pub number_fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Card as returned to its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub id: Uuid,
    pub masked_number: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
}

impl CardView {
    pub fn masked(card: &Card, masked_number: String) -> Self {
        Self {
            id: card.id,
            masked_number,
            created_at: card.created_at,
            number: None,
            expiry: None,
            cvv: None,
        }
    }

    pub fn revealed(mut self, number: String, expiry: String, cvv: String) -> Self {
        self.number = Some(number);
        self.expiry = Some(expiry);
        self.cvv = Some(cvv);
        self
    }
}
