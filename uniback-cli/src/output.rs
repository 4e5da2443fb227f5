//! Output formatting utilities

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;
use uniback_core::domain::result::Result as CoreResult;
use uniback_core::{AccountStatus, Error, OperationResult};

/// A failure already written to stdout as a JSON envelope
///
/// `main` exits non-zero on it without printing the message a second time.
#[derive(Debug)]
pub struct Reported(pub Error);

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Reported {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_status(status: AccountStatus) -> ColoredString {
    match status {
        AccountStatus::Active => status.as_str().green(),
        AccountStatus::Frozen => status.as_str().yellow(),
        AccountStatus::Closed => status.as_str().dimmed(),
    }
}

/// Print a core result either as a JSON envelope or through `render`
pub fn emit<T: Serialize>(result: CoreResult<T>, json: bool, render: impl FnOnce(&T)) -> Result<()> {
    if json {
        return match result {
            Ok(data) => {
                println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
                Ok(())
            }
            Err(e) => {
                let mut envelope = OperationResult::<T>::fail(e.to_string());
                envelope.error_class = Some(e.class());
                println!("{}", serde_json::to_string_pretty(&envelope)?);
                Err(Reported(e).into())
            }
        };
    }

    let data = result?;
    render(&data);
    Ok(())
}
