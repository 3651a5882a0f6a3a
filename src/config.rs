//! Runtime configuration.
//!
//! Defaults are usable as-is; `from_env` overrides individual values from
//! `REDIRECT_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RedirectError, Result};
use crate::filter::{DEFAULT_QUERY_PARAM, DEFAULT_RESPONSE_FIELD};
use crate::manager::DEFAULT_RESOURCE_ID;
use crate::refresh::SchedulerConfig;

pub const ENV_RESOURCE_ID: &str = "REDIRECT_RESOURCE_ID";
pub const ENV_STORAGE_PATH: &str = "REDIRECT_STORAGE_PATH";
pub const ENV_RESPONSE_FIELD: &str = "REDIRECT_RESPONSE_FIELD";
pub const ENV_QUERY_PARAM: &str = "REDIRECT_QUERY_PARAM";
pub const ENV_RELOAD_INTERVAL_SECS: &str = "REDIRECT_RELOAD_INTERVAL_SECS";
pub const ENV_RELOAD_ENABLED: &str = "REDIRECT_RELOAD_ENABLED";

/// Configuration for a redirect deployment.
#[derive(Clone, Debug)]
pub struct RedirectConfig {
    /// Resource id reported in logs and not-found errors
    pub resource_id: String,
    /// Path to the stored rule document
    pub storage_path: PathBuf,
    /// Response field carrying the redirect target
    pub response_field: String,
    /// Request parameter holding the raw query
    pub query_param: String,
    /// Scheduled reload settings
    pub scheduler: SchedulerConfig,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            storage_path: PathBuf::from("./var/data/redirect_rules.json"),
            response_field: DEFAULT_RESPONSE_FIELD.to_string(),
            query_param: DEFAULT_QUERY_PARAM.to_string(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl RedirectConfig {
    /// Defaults overridden by whatever `REDIRECT_*` variables are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RedirectConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id) = lookup(ENV_RESOURCE_ID) {
            config.resource_id = id;
        }
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            config.storage_path = PathBuf::from(path);
        }
        if let Some(field) = lookup(ENV_RESPONSE_FIELD) {
            config.response_field = field;
        }
        if let Some(param) = lookup(ENV_QUERY_PARAM) {
            config.query_param = param;
        }
        if let Some(secs) = lookup(ENV_RELOAD_INTERVAL_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                RedirectError::Config(format!(
                    "{} must be a number of seconds: {}",
                    ENV_RELOAD_INTERVAL_SECS, e
                ))
            })?;
            config.scheduler.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(enabled) = lookup(ENV_RELOAD_ENABLED) {
            config.scheduler.enabled = parse_bool(ENV_RELOAD_ENABLED, &enabled)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.enabled && self.scheduler.refresh_interval.is_zero() {
            return Err(RedirectError::Config(
                "reload interval must be greater than zero".to_string(),
            ));
        }
        if self.response_field.is_empty() {
            return Err(RedirectError::Config("response field must not be empty".to_string()));
        }
        if self.query_param.is_empty() {
            return Err(RedirectError::Config("query parameter must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RedirectError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
