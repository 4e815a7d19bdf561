//! Configuration management for rollcall
//!
//! This module handles loading and validating configuration from environment
//! variables and files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between materialization runs
    pub interval_secs: u64,

    /// How far ahead instances are materialized, in days
    pub horizon_days: i64,

    /// Hours before start at which self-service registration closes
    pub registration_lead_hours: u32,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Chat gateway base URL; None disables outbound delivery
    pub webhook_url: Option<String>,

    /// Bearer token for the gateway
    pub webhook_token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retry attempts on delivery failure
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let interval_secs = std::env::var("ROLLCALL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(3600);

        let horizon_days = std::env::var("ROLLCALL_HORIZON_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(14);

        let registration_lead_hours = std::env::var("ROLLCALL_REGISTRATION_LEAD_HOURS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(25);

        let sqlite_path = std::env::var("ROLLCALL_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/rollcall.db"))
            .into();

        let webhook_url = std::env::var("ROLLCALL_WEBHOOK_URL").ok();
        let webhook_token = std::env::var("ROLLCALL_WEBHOOK_TOKEN").ok();

        let timeout_secs = std::env::var("ROLLCALL_WEBHOOK_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let max_retries = std::env::var("ROLLCALL_WEBHOOK_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let log_level =
            std::env::var("ROLLCALL_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("ROLLCALL_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            scheduler: SchedulerConfig {
                interval_secs,
                horizon_days,
                registration_lead_hours,
            },
            database: DatabaseConfig { sqlite_path },
            transport: TransportConfig {
                webhook_url,
                webhook_token,
                timeout_secs,
                max_retries,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("interval_secs must be greater than 0");
        }

        if self.scheduler.horizon_days <= 0 {
            anyhow::bail!("horizon_days must be positive");
        }

        if self.transport.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }

        if let Some(url) = &self.transport.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("webhook_url must start with http:// or https://");
            }
        }

        Ok(())
    }

    /// Get the run cadence as Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs)
    }

    /// Get the materialization horizon
    #[must_use]
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.scheduler.horizon_days)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig {
                interval_secs: 3600,
                horizon_days: 14,
                registration_lead_hours: 25,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/rollcall.db"),
            },
            transport: TransportConfig {
                webhook_url: None,
                webhook_token: None,
                timeout_secs: 10,
                max_retries: 3,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_interval() {
        let mut config = Config::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_webhook_url() {
        let mut config = Config::default();
        config.transport.webhook_url = Some(String::from("gw.example.com"));
        assert!(config.validate().is_err());

        config.transport.webhook_url = Some(String::from("https://gw.example.com"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_conversions() {
        let config = Config::default();
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert_eq!(config.horizon(), chrono::Duration::days(14));
    }
}
