//! Uniqueness guard - retry identifier generation until the store has no match

use tracing::debug;

use crate::domain::result::{Error, Result};

/// Loops generate → check until a candidate is free
///
/// Nothing is persisted between attempts. Errors from the generator or the
/// existence check end the loop immediately.
#[derive(Debug, Clone, Copy)]
pub struct UniquenessGuard {
    max_attempts: Option<u32>,
}

impl UniquenessGuard {
    /// `None` retries for as long as collisions keep happening
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self { max_attempts }
    }

    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// First generated candidate that `exists` reports as free
    ///
    /// `kind` names the identifier in logs and in `IdentifierSpaceExhausted`.
    pub fn acquire<T>(
        &self,
        kind: &'static str,
        mut generate: impl FnMut() -> Result<T>,
        mut exists: impl FnMut(&T) -> Result<bool>,
    ) -> Result<T> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(Error::IdentifierSpaceExhausted { kind, attempts });
                }
            }
            attempts = attempts.saturating_add(1);

            let candidate = generate()?;
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            debug!(kind, attempt = attempts, "identifier collision, retrying");
        }
    }
}
