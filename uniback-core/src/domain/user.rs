//! User domain model

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

pub const MAX_USERNAME_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 6;

/// A registered account holder
///
/// `password_hash` is an Argon2id PHC string; the password itself is never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration request
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub phone: Option<String>,
}

impl NewUser {
    /// Trim fields and check their shape. Uniqueness is checked by the store.
    pub fn validate(mut self) -> Result<Self> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();
        self.phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if self.username.is_empty() {
            return Err(Error::validation("username must not be empty"));
        }
        if self.username.chars().count() > MAX_USERNAME_LEN {
            return Err(Error::validation(format!(
                "username must be at most {} characters",
                MAX_USERNAME_LEN
            )));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if !is_valid_email(&self.email) {
            return Err(Error::validation(format!("invalid email '{}'", self.email)));
        }
        if let Some(phone) = &self.phone {
            if !is_valid_phone(phone) {
                return Err(Error::validation(format!(
                    "invalid phone '{}', expected E.164 like +14155550123",
                    phone
                )));
            }
        }
        Ok(self)
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("phone pattern is valid"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// E.164: leading `+`, no leading zero, 8 to 15 digits
pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewUser {
        NewUser {
            username: "  alice ".to_string(),
            password: "secret-pw".to_string(),
            email: "alice@example.com".to_string(),
            phone: Some("+14155550123".to_string()),
        }
    }

    #[test]
    fn test_validate_trims_fields() {
        let user = request().validate().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_empty_phone_becomes_none() {
        let mut req = request();
        req.phone = Some("   ".to_string());
        assert!(req.validate().unwrap().phone.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut req = request();
        req.username = " ".to_string();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let mut req = request();
        req.password = "12345".to_string();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let mut req = request();
        req.email = "not-an-email".to_string();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let mut req = request();
        req.phone = Some("0123".to_string());
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_contact_formats() {
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(is_valid_phone("+79991234567"));
        assert!(!is_valid_phone("79991234567"));
        assert!(!is_valid_phone("+0123456789"));
    }
}
