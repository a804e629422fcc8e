//! Till configuration.
//!
//! Values come from an optional JSON file and are then overridden by `TILL_*`
//! environment variables. Everything has a default so the controller runs
//! against a local back office with no configuration at all.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::normalize_base_url;
use crate::error::{RegisterError, Result};
use crate::models::within_till_bound;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_NOTICE_TTL_SECS: u64 = 5;

/// Opening float the till is expected to start with (200.00).
pub const DEFAULT_REFERENCE_AMOUNT: Decimal = Decimal::from_parts(20000, 0, 0, false, 2);

const ENV_API_URL: &str = "TILL_API_URL";
const ENV_REFERENCE_AMOUNT: &str = "TILL_REFERENCE_AMOUNT";
const ENV_TIMEOUT_SECS: &str = "TILL_TIMEOUT_SECS";
const ENV_NOTICE_TTL_SECS: &str = "TILL_NOTICE_TTL_SECS";
const ENV_LOG_DIR: &str = "TILL_LOG_DIR";
const ENV_EXPORT_DIR: &str = "TILL_EXPORT_DIR";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TillConfig {
    /// Back-office base URL, without the `/api` suffix.
    pub api_url: String,
    /// Expected opening float used by the verification step.
    pub reference_amount: Decimal,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// How long a notification stays visible.
    pub notice_ttl_secs: u64,
    /// Directory for the rolling log file. Console-only logging when unset.
    pub log_dir: Option<PathBuf>,
    /// Where exported reports are written.
    pub export_dir: PathBuf,
}

impl Default for TillConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            reference_amount: DEFAULT_REFERENCE_AMOUNT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            notice_ttl_secs: DEFAULT_NOTICE_TTL_SECS,
            log_dir: None,
            export_dir: PathBuf::from("."),
        }
    }
}

impl TillConfig {
    /// Load the file (when given), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.api_url = normalize_base_url(&config.api_url);
        config.validate()?;
        debug!(api_url = %config.api_url, reference = %config.reference_amount, "Configuration loaded");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            RegisterError::Validation(format!("Invalid config file {}: {e}", path.display()))
        })
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_str(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(amount) = env_parsed::<Decimal>(ENV_REFERENCE_AMOUNT) {
            self.reference_amount = amount;
        }
        if let Some(secs) = env_parsed::<u64>(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs;
        }
        if let Some(secs) = env_parsed::<u64>(ENV_NOTICE_TTL_SECS) {
            self.notice_ttl_secs = secs;
        }
        if let Some(dir) = env_str(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_str(ENV_EXPORT_DIR) {
            self.export_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.reference_amount.is_sign_negative() {
            return Err(RegisterError::Validation(
                "reference_amount must not be negative".into(),
            ));
        }
        if !within_till_bound(self.reference_amount) {
            return Err(RegisterError::Validation(
                "reference_amount is larger than the till accepts".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(RegisterError::Validation(
                "timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}
