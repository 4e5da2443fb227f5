//! CLI command implementations

pub mod account;
pub mod card;
pub mod history;
pub mod logs;
pub mod money;
pub mod user;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use dialoguer::Password;
use uniback_core::{CallContext, EntryPoint, Error, LogEvent, LoggingService, UnibackContext};

/// Who is running the command, from global flags or the environment
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    /// The given password, or an interactive prompt
    pub fn password(&self, confirm: bool) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        let mut prompt = Password::new().with_prompt("Password");
        if confirm {
            prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
        }
        Ok(prompt.interact()?)
    }
}

/// An authenticated user with an open context
pub struct Session {
    pub ctx: UnibackContext,
    pub username: String,
}

impl Session {
    /// Open the ledger and check the user's password before anything else
    pub fn open(credentials: &Credentials) -> Result<Self> {
        let Some(username) = credentials.user.clone() else {
            bail!("No user given. Pass --user or set UNIBACK_USER.");
        };
        let ctx = get_context()?;
        let password = credentials.password(false)?;
        ctx.user_service.authenticate(&ctx.call_context(), &username, &password)?;
        Ok(Self { ctx, username })
    }

    pub fn call(&self) -> CallContext {
        self.ctx.call_context()
    }
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Event for a command that failed with `error`
///
/// Only the code and class of a ledger error are kept; anything else is
/// recorded as an internal fault. Messages never reach the log.
pub fn failure_event(command: &str, error: &anyhow::Error) -> LogEvent {
    let event = format!("{}_failed", command);
    let core = error.chain().find_map(|cause| cause.downcast_ref::<Error>());
    match core {
        Some(core) => LogEvent::failure(event, core),
        None => LogEvent::new(event).with_error("internal").with_error_details("fault"),
    }
    .with_command(command)
}

/// Get the uniback directory from environment or default
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("UNIBACK_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".uniback")
}

/// Open the context on the data directory
pub fn get_context() -> Result<UnibackContext> {
    let data_dir = get_data_dir();
    UnibackContext::new(&data_dir)
        .with_context(|| format!("Failed to initialize uniback in {}", data_dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Reported;
    use anyhow::Context;
    use rust_decimal::Decimal;

    fn overdraft() -> Error {
        Error::InsufficientFunds {
            balance: Decimal::new(12345, 2),
            required: Decimal::new(50000, 2),
        }
    }

    #[test]
    fn test_failure_event_keeps_only_the_code() {
        let error = anyhow::Error::new(overdraft());
        let event = failure_event("withdraw", &error);

        assert_eq!(event.event, "withdraw_failed");
        assert_eq!(event.command.as_deref(), Some("withdraw"));
        assert_eq!(event.error_message.as_deref(), Some("insufficient_funds"));
        assert_eq!(event.error_details.as_deref(), Some("rejected"));
    }

    #[test]
    fn test_failure_event_finds_wrapped_errors() {
        let reported = anyhow::Error::new(Reported(overdraft()));
        let event = failure_event("withdraw", &reported);
        assert_eq!(event.error_message.as_deref(), Some("insufficient_funds"));

        let contextual: anyhow::Result<()> = Err(Error::validation("invalid phone '+1 415 555 0123'"))
            .context("Failed to register");
        let event = failure_event("user", &contextual.unwrap_err());
        assert_eq!(event.error_message.as_deref(), Some("validation"));
    }

    #[test]
    fn test_failure_event_hides_other_messages() {
        let error = anyhow::anyhow!("Failed to initialize uniback in /home/alice/.uniback");
        let event = failure_event("account", &error);
        assert_eq!(event.error_message.as_deref(), Some("internal"));
        assert_eq!(event.error_details.as_deref(), Some("fault"));
    }
}
