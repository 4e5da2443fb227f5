//! User service - registration and credential checks

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::Utc;
use rand::rngs::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{NewUser, User};
use crate::ports::{CallContext, LedgerStore};
use crate::services::account::owner;

/// Same message for unknown users and wrong passwords
const INVALID_CREDENTIALS: &str = "invalid credentials";

pub struct UserService {
    store: Arc<dyn LedgerStore>,
    params: Params,
}

impl UserService {
    /// Argon2id with the crate's default cost parameters
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            params: Params::default(),
        }
    }

    /// Custom Argon2id costs (memory in KiB, iterations, lanes)
    pub fn with_params(store: Arc<dyn LedgerStore>, memory_kib: u32, iterations: u32, lanes: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, lanes, None)
            .map_err(|e| Error::validation(format!("invalid argon2 params: {}", e)))?;
        Ok(Self { store, params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Register a new user; username, email and phone must all be unused
    pub fn register(&self, ctx: &CallContext, request: NewUser) -> Result<User> {
        let request = request.validate()?;

        if let Some(field) =
            self.store
                .find_taken_user_field(ctx, &request.username, &request.email, request.phone.as_deref())?
        {
            warn!(field, "registration refused, field already taken");
            return Err(Error::validation(format!("{} is already registered", field)));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher()
            .hash_password(request.password.as_bytes(), &salt)
            .map_err(|e| Error::crypto(format!("password hashing failed: {}", e)))?
            .to_string();

        let user = User {
            id: Uuid::new_v4(),
            username: request.username,
            password_hash,
            email: request.email,
            phone: request.phone,
            created_at: Utc::now(),
        };
        self.store.create_user(ctx, &user)?;
        info!(user = %user.username, "user registered");
        Ok(user)
    }

    /// The user named `username` if `password` matches
    pub fn authenticate(&self, ctx: &CallContext, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .get_user_by_username(ctx, username)?
            .ok_or_else(|| Error::not_found(INVALID_CREDENTIALS))?;

        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|e| Error::persistence(format!("stored password hash is malformed: {}", e)))?;
        if self.hasher().verify_password(password.as_bytes(), &parsed).is_err() {
            warn!(user = %username, "authentication failed");
            return Err(Error::not_found(INVALID_CREDENTIALS));
        }
        Ok(user)
    }

    pub fn resolve(&self, ctx: &CallContext, username: &str) -> Result<User> {
        owner(self.store.as_ref(), ctx, username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;

    fn service() -> UserService {
        UserService::with_params(Arc::new(InMemoryLedgerStore::new()), 8, 1, 1).unwrap()
    }

    fn request(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "correct horse".to_string(),
            email: email.to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_register_hashes_password() {
        let service = service();
        let user = service
            .register(&CallContext::background(), request("alice", "alice@example.com"))
            .unwrap();
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(!user.password_hash.contains("correct horse"));
    }

    #[test]
    fn test_duplicate_fields_are_rejected() {
        let service = service();
        let ctx = CallContext::background();
        service.register(&ctx, request("alice", "alice@example.com")).unwrap();

        let err = service.register(&ctx, request("alice", "other@example.com")).unwrap_err();
        assert!(err.to_string().contains("username"));
        let err = service.register(&ctx, request("bob", "alice@example.com")).unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn test_authenticate() {
        let service = service();
        let ctx = CallContext::background();
        service.register(&ctx, request("alice", "alice@example.com")).unwrap();

        assert!(service.authenticate(&ctx, "alice", "correct horse").is_ok());

        let wrong = service.authenticate(&ctx, "alice", "battery staple").unwrap_err();
        let unknown = service.authenticate(&ctx, "nobody", "correct horse").unwrap_err();
        assert!(matches!(wrong, Error::NotFound(_)));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[test]
    fn test_resolve() {
        let service = service();
        let ctx = CallContext::background();
        let user = service.register(&ctx, request("alice", "alice@example.com")).unwrap();
        assert_eq!(service.resolve(&ctx, "alice").unwrap().id, user.id);
        assert!(matches!(service.resolve(&ctx, "bob"), Err(Error::NotFound(_))));
    }
}
