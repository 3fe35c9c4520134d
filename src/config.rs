//! Configuration parsed from environment variables.
//!
//! Parsing goes through a key-lookup function so tests can feed a map
//! instead of mutating the process environment; `from_env` wraps it.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::consts::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS,
    DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS, DEFAULT_WRITE_TIMEOUT_MS,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config: {var}")]
    Missing { var: &'static str },
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

// =============================================================================
// SYNC
// =============================================================================

/// Tuning knobs for the sync layer and workspace directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Bound on each remote write before it counts as failed (rollback).
    pub write_timeout_ms: u64,
    /// Bound on listings and reconciliation refetches.
    pub fetch_timeout_ms: u64,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Optional:
    /// - `SYNC_WRITE_TIMEOUT_MS`: default 10000
    /// - `SYNC_FETCH_TIMEOUT_MS`: default 10000
    /// - `SYNC_EVENT_CAPACITY`: default 1024
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a present value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Parse from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a present value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            write_timeout_ms: parse_or(&lookup, "SYNC_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS)?,
            fetch_timeout_ms: parse_or(&lookup, "SYNC_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?,
            event_capacity: parse_or(&lookup, "SYNC_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?,
        })
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

// =============================================================================
// REMOTE
// =============================================================================

/// Connection settings for [`crate::remote::HttpRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl RemoteConfig {
    /// Required:
    /// - `REMOTE_BASE_URL`
    ///
    /// Optional:
    /// - `REMOTE_API_TOKEN`: sent as a bearer token
    /// - `REMOTE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `REMOTE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns `Missing` without a base URL, `Invalid` on unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Parse from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `Missing` without a base URL, `Invalid` on unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("REMOTE_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing { var: "REMOTE_BASE_URL" })?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { var: "REMOTE_BASE_URL", value: base_url });
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: lookup("REMOTE_API_TOKEN").filter(|v| !v.is_empty()),
            request_timeout_secs: parse_or(&lookup, "REMOTE_REQUEST_TIMEOUT_SECS", DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS)?,
            connect_timeout_secs: parse_or(&lookup, "REMOTE_CONNECT_TIMEOUT_SECS", DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS)?,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn env_lookup(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => Some(value),
        Err(_) => None,
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
