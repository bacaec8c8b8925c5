//! Runtime configuration.
//!
//! Constants for the binary plus `MonitorConfig`, loaded from an optional
//! JSON file and overridden by environment variables. Every field has a
//! default so an empty file (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "medibox-monitor";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "MEDIBOX_MONITOR_CONFIG";
/// Env var overriding `upstream_url`.
pub const UPSTREAM_URL_ENV: &str = "MEDIBOX_UPSTREAM_URL";
/// Env var overriding `bind_addr`.
pub const BIND_ADDR_ENV: &str = "MEDIBOX_BIND_ADDR";

pub const DEFAULT_HUMIDITY_MAX: f64 = 80.0;
pub const DEFAULT_TEMPERATURE_MAX: f64 = 30.0;

/// Nominal chart ceilings so one extreme reading cannot flatten a series.
pub const TEMPERATURE_CEILING_HINT: f64 = 40.0;
pub const HUMIDITY_CEILING_HINT: f64 = 100.0;

/// Upper bound for `poll_interval_secs` (one day).
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Upper bound for every configurable or requested time window (one year).
pub const MAX_WINDOW_HOURS: i64 = 8760;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medibox_monitor_lib=info,medibox_monitor=info,tower_http=warn"
}

/// Default config file location: `<config_dir>/medibox-monitor/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Where "delayed" doses are counted in the adherence summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelayedBucket {
    /// Delayed doses share the pending bucket.
    #[default]
    Pending,
    /// Delayed doses are counted as missed.
    Missed,
}

/// Environment thresholds. Crossing is strict `>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub humidity_max: f64,
    pub temperature_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            humidity_max: DEFAULT_HUMIDITY_MAX,
            temperature_max: DEFAULT_TEMPERATURE_MAX,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Base URL of the upstream records API (roster, history, readings...).
    pub upstream_url: String,
    /// Timeout for one upstream request.
    pub upstream_timeout_secs: u64,
    /// Address the HTTP surface binds to.
    pub bind_addr: String,
    pub thresholds: Thresholds,
    /// A past, unconfirmed dose stays `delayed` for this long before it is `missed`.
    pub missed_grace_minutes: i64,
    pub delayed_bucket: DelayedBucket,
    /// Trend lookback window.
    pub trend_window_hours: i64,
    /// Missed doses older than this do not produce feed alerts.
    pub missed_alert_window_hours: i64,
    /// Device status poll interval.
    pub poll_interval_secs: u64,
    pub history_limit: u32,
    pub alerts_limit: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            upstream_url: "http://127.0.0.1:5000/api".into(),
            upstream_timeout_secs: 15,
            bind_addr: "127.0.0.1:7070".into(),
            thresholds: Thresholds::default(),
            missed_grace_minutes: 60,
            delayed_bucket: DelayedBucket::Pending,
            trend_window_hours: 24,
            missed_alert_window_hours: 24,
            poll_interval_secs: 30,
            history_limit: 50,
            alerts_limit: 25,
        }
    }
}

impl MonitorConfig {
    /// Load from the configured path (if any), then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var(UPSTREAM_URL_ENV) {
            config.upstream_url = url;
        }
        if let Ok(addr) = std::env::var(BIND_ADDR_ENV) {
            config.bind_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "upstream_url",
                reason: "must not be empty".into(),
            });
        }
        if !(1..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_secs) {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: format!("must be between 1 and {MAX_POLL_INTERVAL_SECS}"),
            });
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.trend_window_hours) {
            return Err(ConfigError::Invalid {
                field: "trend_window_hours",
                reason: format!("must be between 1 and {MAX_WINDOW_HOURS}"),
            });
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.missed_alert_window_hours) {
            return Err(ConfigError::Invalid {
                field: "missed_alert_window_hours",
                reason: format!("must be between 1 and {MAX_WINDOW_HOURS}"),
            });
        }
        if !(0..=MAX_WINDOW_HOURS * 60).contains(&self.missed_grace_minutes) {
            return Err(ConfigError::Invalid {
                field: "missed_grace_minutes",
                reason: format!("must be between 0 and {}", MAX_WINDOW_HOURS * 60),
            });
        }
        if !self.thresholds.humidity_max.is_finite() || !self.thresholds.temperature_max.is_finite()
        {
            return Err(ConfigError::Invalid {
                field: "thresholds",
                reason: "must be finite numbers".into(),
            });
        }
        Ok(())
    }

    // Durations are clamped so a config built without `validate()` still
    // cannot overflow chrono.

    pub fn missed_grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.missed_grace_minutes.clamp(0, MAX_WINDOW_HOURS * 60))
    }

    pub fn trend_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.trend_window_hours.clamp(1, MAX_WINDOW_HOURS))
    }

    pub fn missed_alert_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.missed_alert_window_hours.clamp(1, MAX_WINDOW_HOURS))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
