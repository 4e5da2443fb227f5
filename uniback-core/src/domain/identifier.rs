//! Account and card number generation
//!
//! Account numbers follow the 22-digit layout:
//!
//! ```text
//! 40817 | 810 | ccc | k | nnnnnnnnnn
//! type    cur   ctrl  chk  serial
//! ```
//!
//! Only the format is enforced; the control and check segments are random.
//! Card numbers start with `2`, carry 14 random digits and end in a Luhn
//! check digit.

use chrono::{DateTime, Datelike, Months, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use super::result::{Error, Result};

/// Entity type code for individual current accounts
pub const ACCOUNT_ENTITY_CODE: &str = "40817";
/// Ruble currency code
pub const ACCOUNT_CURRENCY_CODE: &str = "810";
pub const ACCOUNT_NUMBER_LEN: usize = 22;

pub const CARD_PREFIX: &str = "2";
pub const CARD_NUMBER_LEN: usize = 16;

/// How long a freshly issued card stays valid
pub const CARD_VALIDITY_YEARS: u32 = 5;

/// Generate a 22-digit account number
///
/// Uses the thread-local RNG. Collisions are handled by the uniqueness guard.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    let control: u32 = rng.gen_range(0..1000);
    let check: u32 = rng.gen_range(0..10);
    let serial: u64 = rng.gen_range(0..10_000_000_000);
    format!(
        "{}{}{:03}{}{:010}",
        ACCOUNT_ENTITY_CODE, ACCOUNT_CURRENCY_CODE, control, check, serial
    )
}

pub fn is_valid_account_number(number: &str) -> bool {
    number.len() == ACCOUNT_NUMBER_LEN
        && number.bytes().all(|b| b.is_ascii_digit())
        && number.starts_with(ACCOUNT_ENTITY_CODE)
        && number[ACCOUNT_ENTITY_CODE.len()..].starts_with(ACCOUNT_CURRENCY_CODE)
}

/// Generate a 16-digit card number from the OS random source
pub fn generate_card_number() -> Result<String> {
    let body_len = CARD_NUMBER_LEN - CARD_PREFIX.len() - 1;
    let mut number = String::with_capacity(CARD_NUMBER_LEN);
    number.push_str(CARD_PREFIX);
    for _ in 0..body_len {
        number.push(random_digit()?);
    }
    let check = luhn_check_digit(&number)?;
    number.push(char::from(b'0' + check));
    Ok(number)
}

/// Luhn check digit for a digit string that does not yet carry one
///
/// Walks right to left; digits at even positions (0-based) are doubled and
/// reduced by 9 when they exceed 9.
pub fn luhn_check_digit(partial: &str) -> Result<u8> {
    let mut sum: u32 = 0;
    for (i, c) in partial.chars().rev().enumerate() {
        let mut digit = c
            .to_digit(10)
            .ok_or_else(|| Error::validation(format!("'{}' is not a digit", c)))?;
        if i % 2 == 0 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    Ok(((10 - sum % 10) % 10) as u8)
}

/// Whether the last digit of `number` is the Luhn check digit of the rest
pub fn is_luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (body, last) = number.split_at(number.len() - 1);
    match luhn_check_digit(body) {
        Ok(check) => last.as_bytes()[0] - b'0' == check,
        Err(_) => false,
    }
}

/// Three zero-padded digits from the OS random source
pub fn generate_cvv() -> Result<String> {
    let mut cvv = String::with_capacity(3);
    for _ in 0..3 {
        cvv.push(random_digit()?);
    }
    Ok(cvv)
}

/// `MM/YY` expiry for a card issued at `now`
pub fn card_expiry(now: DateTime<Utc>) -> Result<String> {
    // Feb 29 rolls back to Feb 28 when the target year is not a leap year
    let expires = now
        .checked_add_months(Months::new(12 * CARD_VALIDITY_YEARS))
        .ok_or_else(|| Error::validation(format!("no card expiry representable after {}", now)))?;
    Ok(format!("{:02}/{:02}", expires.month(), expires.year() % 100))
}

/// Hide all but the last four digits
pub fn mask_card_number(number: &str) -> String {
    let len = number.chars().count();
    if len <= 4 {
        return number.to_string();
    }
    let visible: String = number.chars().skip(len - 4).collect();
    format!("{}{}", "*".repeat(len - 4), visible)
}

fn random_digit() -> Result<char> {
    // Rejection sampling keeps digits uniform: 250 is the largest multiple of 10 below 256
    loop {
        let mut byte = [0u8; 1];
        OsRng
            .try_fill_bytes(&mut byte)
            .map_err(|e| Error::crypto(format!("random source failed: {}", e)))?;
        if byte[0] < 250 {
            return Ok(char::from(b'0' + byte[0] % 10));
        }
    }
}
