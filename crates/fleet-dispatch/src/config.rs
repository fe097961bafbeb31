//! # Dispatch Configuration
//!
//! Environment-based configuration for the dispatch service.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Dispatch service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store file location
    pub store_path: PathBuf,

    /// Write fixtures on start when the store is empty
    pub populate_on_start: bool,

    /// Seed for generated fixture values
    pub fixture_seed: u64,

    /// Run the periodic battery audit
    pub audit_enabled: bool,

    /// Time between two audits
    pub audit_interval: Duration,

    /// Logging level
    pub log_level: String,
}

impl Config {
    /// Load configuration from `.env` and environment variables
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` for a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` for a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let audit_interval_secs: u64 = parse(&lookup, "FLEET_AUDIT_INTERVAL_SECS", 60)?;
        if audit_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "FLEET_AUDIT_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            store_path: lookup("FLEET_STORE_PATH")
                .map_or_else(|| PathBuf::from("./data/fleet.redb"), PathBuf::from),
            populate_on_start: flag(&lookup, "FLEET_POPULATE_ON_START", true)?,
            fixture_seed: parse(&lookup, "FLEET_FIXTURE_SEED", 42)?,
            audit_enabled: flag(&lookup, "FLEET_AUDIT_ENABLED", false)?,
            audit_interval: Duration::from_secs(audit_interval_secs),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./data/fleet.redb"),
            populate_on_start: true,
            fixture_seed: 42,
            audit_enabled: false,
            audit_interval: Duration::from_secs(60),
            log_level: "info".to_string(),
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FLEET_STORE_PATH", "/tmp/f.redb"),
            ("FLEET_POPULATE_ON_START", "0"),
            ("FLEET_FIXTURE_SEED", "7"),
            ("FLEET_AUDIT_ENABLED", "true"),
            ("FLEET_AUDIT_INTERVAL_SECS", "5"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/tmp/f.redb"));
        assert!(!config.populate_on_start);
        assert_eq!(config.fixture_seed, 7);
        assert!(config.audit_enabled);
        assert_eq!(config.audit_interval, Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let err = Config::from_lookup(lookup(&[("FLEET_FIXTURE_SEED", "abc")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "FLEET_FIXTURE_SEED",
                value: "abc".into()
            }
        );

        assert!(Config::from_lookup(lookup(&[("FLEET_AUDIT_INTERVAL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("FLEET_AUDIT_ENABLED", "yes")])).is_err());
    }
}
