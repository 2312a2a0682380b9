//! Relay configuration

use std::time::Duration;

use thiserror::Error;

/// Default idle timeout between upstream events
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of records buffered per relay
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default bound on one upstream cancel request
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

pub const IDLE_TIMEOUT_ENV: &str = "STREAMRELAY_IDLE_TIMEOUT_SECS";
pub const CHANNEL_CAPACITY_ENV: &str = "STREAMRELAY_CHANNEL_CAPACITY";
pub const VERIFY_FINAL_STATE_ENV: &str = "STREAMRELAY_VERIFY_FINAL_STATE";
pub const CANCEL_TIMEOUT_ENV: &str = "STREAMRELAY_CANCEL_TIMEOUT_SECS";

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {name}: {value:?} ({reason})")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Settings shared by every relay a [`RelayManager`](crate::RelayManager) spawns
///
/// ```
/// use std::time::Duration;
/// use streamrelay_core::RelayConfig;
///
/// let config = RelayConfig::default()
///     .with_idle_timeout(Duration::from_secs(10))
///     .with_channel_capacity(16);
/// assert_eq!(config.idle_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Longest silence tolerated between upstream events
    ///
    /// Also bounds how long one record may wait for the client to read it.
    pub idle_timeout: Duration,
    /// Records buffered between the relay task and the client
    pub channel_capacity: usize,
    /// Read the stored message back after completion and log mismatches
    pub verify_final_state: bool,
    /// Longest wait for upstream to acknowledge a cancel
    pub cancel_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            verify_final_state: false,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `STREAMRELAY_IDLE_TIMEOUT_SECS`,
    /// `STREAMRELAY_CHANNEL_CAPACITY`, `STREAMRELAY_VERIFY_FINAL_STATE` and
    /// `STREAMRELAY_CANCEL_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(IDLE_TIMEOUT_ENV) {
            let secs = parse_positive(IDLE_TIMEOUT_ENV, &value)?;
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup(CHANNEL_CAPACITY_ENV) {
            let capacity = parse_positive(CHANNEL_CAPACITY_ENV, &value)?;
            config.channel_capacity = capacity as usize;
        }
        if let Some(value) = lookup(VERIFY_FINAL_STATE_ENV) {
            config.verify_final_state = parse_bool(VERIFY_FINAL_STATE_ENV, &value)?;
        }
        if let Some(value) = lookup(CANCEL_TIMEOUT_ENV) {
            let secs = parse_positive(CANCEL_TIMEOUT_ENV, &value)?;
            config.cancel_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-relay buffer size (at least 1)
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_verify_final_state(mut self, verify: bool) -> Self {
        self.verify_final_state = verify;
        self
    }

    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError {
            name,
            value: value.to_string(),
            reason: "must be greater than zero",
        }),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError {
            name,
            value: value.to_string(),
            reason: "expected a whole number",
        }),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError {
            name,
            value: value.to_string(),
            reason: "expected true or false",
        }),
    }
}
