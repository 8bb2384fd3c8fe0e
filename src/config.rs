//! Client configuration parsing, environment overrides, and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_batch_max_amount() -> usize {
    100
}

fn default_log_level() -> String {
    "info".into()
}

/// Client configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Aggregator address as `host:port`.
    pub server_address: String,
    /// Agency on whose behalf records are submitted.
    pub agency_id: u8,
    /// Maximum records per batch.
    #[serde(default = "default_batch_max_amount")]
    pub batch_max_amount: usize,
    /// Delay between rounds, in milliseconds.
    #[serde(default)]
    pub loop_period_ms: u64,
    /// Record file; defaults to `/data/agency-{agency_id}.csv`.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path, applying
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or any
    /// value fails to parse or validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_address = lookup("CLI_SERVER_ADDRESS")
            .ok_or_else(|| AppError::Config("CLI_SERVER_ADDRESS is not set".into()))?;
        let agency_id = parse_var("CLI_ID", lookup("CLI_ID"))?
            .ok_or_else(|| AppError::Config("CLI_ID is not set".into()))?;

        let mut config = Self {
            server_address,
            agency_id,
            batch_max_amount: default_batch_max_amount(),
            loop_period_ms: 0,
            data_path: None,
            log_level: default_log_level(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the agency identity, e.g. from the command line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the resulting configuration is invalid.
    pub fn with_agency(mut self, agency_id: u8) -> Result<Self> {
        self.agency_id = agency_id;
        self.validate()?;
        Ok(self)
    }

    /// Delay between rounds.
    #[must_use]
    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    /// Record file path, derived from the agency when not configured.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/data/agency-{}.csv", self.agency_id)))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(address) = lookup("CLI_SERVER_ADDRESS") {
            self.server_address = address;
        }
        if let Some(agency) = parse_var("CLI_ID", lookup("CLI_ID"))? {
            self.agency_id = agency;
        }
        if let Some(amount) = parse_var("CLI_BATCH_MAXAMOUNT", lookup("CLI_BATCH_MAXAMOUNT"))? {
            self.batch_max_amount = amount;
        }
        if let Some(period) = parse_var("CLI_LOOP_PERIOD_MS", lookup("CLI_LOOP_PERIOD_MS"))? {
            self.loop_period_ms = period;
        }
        if let Some(path) = lookup("CLI_DATA_PATH") {
            self.data_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("CLI_LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server_address.trim().is_empty() {
            return Err(AppError::Config("server_address must not be empty".into()));
        }

        if self.batch_max_amount == 0 {
            return Err(AppError::Config(
                "batch_max_amount must be greater than zero".into(),
            ));
        }

        if self.batch_max_amount > usize::from(u16::MAX) {
            return Err(AppError::Config(format!(
                "batch_max_amount must not exceed {}",
                u16::MAX
            )));
        }

        Ok(())
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|err| AppError::Config(format!("{key} '{raw}' is invalid: {err}")))
        })
        .transpose()
}
