//! Field protector port - encryption of card fields at rest

use crate::domain::result::Result;

/// Encrypts sensitive fields before they reach the store
///
/// `protect` must be non-deterministic; `fingerprint` must be deterministic
/// for a given key so it can back a uniqueness index.
pub trait FieldProtector: Send + Sync {
    fn protect(&self, plaintext: &str) -> Result<Vec<u8>>;

    fn reveal(&self, ciphertext: &[u8]) -> Result<String>;

    fn fingerprint(&self, plaintext: &str) -> String;
}
