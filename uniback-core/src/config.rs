//! Configuration management
//!
//! Settings live in `<data dir>/settings.json`:
//! ```json
//! {
//!   "ledger": { "fee": "0.50", "maxIdentifierAttempts": 1000, "timeoutSecs": 3 },
//!   "keys": { "publicKeyPath": "...", "privateKeyPath": "..." }
//! }
//! ```
//! Environment variables override the file. Keys the ledger does not manage
//! are preserved when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const ENV_FEE: &str = "UNIBACK_FEE";
pub const ENV_MAX_ID_ATTEMPTS: &str = "UNIBACK_MAX_ID_ATTEMPTS";
pub const ENV_TIMEOUT_SECS: &str = "UNIBACK_TIMEOUT_SECS";
pub const ENV_PUBLIC_KEY: &str = "UNIBACK_PUBLIC_KEY";
pub const ENV_PRIVATE_KEY: &str = "UNIBACK_PRIVATE_KEY";

pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    keys: KeySettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fee: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_identifier_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key_path: Option<PathBuf>,
}

/// Effective configuration after defaults and env overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Flat fee charged on every money movement
    pub fee: Decimal,
    /// Ceiling for identifier generation retries; `None` means unbounded
    pub max_identifier_attempts: Option<u32>,
    /// Default deadline for one request's store calls
    pub timeout: Duration,
    pub public_key_path: PathBuf,
    pub private_key_path: PathBuf,
}

impl Config {
    /// Defaults for a data directory, ignoring settings.json and env
    pub fn defaults(data_dir: &Path) -> Self {
        let keys = data_dir.join("keys");
        Self {
            fee: Decimal::ZERO,
            max_identifier_attempts: Some(DEFAULT_MAX_ID_ATTEMPTS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            public_key_path: keys.join("uniback.pub"),
            private_key_path: keys.join("uniback.key"),
        }
    }

    /// Load config from the data directory, then apply env overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment lookup
    pub fn load_with_env(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(data_dir)?;
        let mut config = Self::defaults(data_dir);

        if let Some(fee) = raw.ledger.fee {
            config.fee = fee;
        }
        if let Some(attempts) = raw.ledger.max_identifier_attempts {
            config.max_identifier_attempts = attempts_limit(attempts);
        }
        if let Some(secs) = raw.ledger.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(path) = raw.keys.public_key_path {
            config.public_key_path = path;
        }
        if let Some(path) = raw.keys.private_key_path {
            config.private_key_path = path;
        }

        if let Some(fee) = env(ENV_FEE) {
            config.fee = parse_env(ENV_FEE, &fee)?;
        }
        if let Some(attempts) = env(ENV_MAX_ID_ATTEMPTS) {
            config.max_identifier_attempts = attempts_limit(parse_env(ENV_MAX_ID_ATTEMPTS, &attempts)?);
        }
        if let Some(secs) = env(ENV_TIMEOUT_SECS) {
            config.timeout = Duration::from_secs(parse_env(ENV_TIMEOUT_SECS, &secs)?);
        }
        if let Some(path) = env(ENV_PUBLIC_KEY) {
            config.public_key_path = PathBuf::from(path);
        }
        if let Some(path) = env(ENV_PRIVATE_KEY) {
            config.private_key_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Save config to the data directory, keeping keys we don't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;

        settings.ledger.fee = Some(self.fee);
        settings.ledger.max_identifier_attempts = Some(self.max_identifier_attempts.unwrap_or(0));
        settings.ledger.timeout_secs = Some(self.timeout.as_secs());
        settings.keys.public_key_path = Some(self.public_key_path.clone());
        settings.keys.private_key_path = Some(self.private_key_path.clone());

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join("settings.json"), content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fee < Decimal::ZERO {
            bail!("ledger fee must not be negative, got {}", self.fee);
        }
        if self.fee.normalize().scale() > 2 {
            bail!("ledger fee {} has more than 2 decimal places", self.fee);
        }
        if self.timeout.is_zero() {
            bail!("ledger timeout must be at least one second");
        }
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid settings in {}", settings_path.display()))
}

/// `0` in settings means no ceiling
fn attempts_limit(attempts: u32) -> Option<u32> {
    (attempts > 0).then_some(attempts)
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, value, e))
}
