//! Daemon configuration.
//!
//! A single source of truth for everything tunable, loaded from environment
//! variables with sensible defaults and validated up front. The binary layers
//! command-line flags on top of this.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_ANCHOR_INTERVAL;
use crate::constants::DEFAULT_CONFIRM_INTERVAL;
use crate::constants::DEFAULT_VALID_MIMES;
use crate::constants::DEFAULT_VOTE_PERIOD_SECS;
use crate::constants::MAX_FILE_SIZE;
use crate::constants::MAX_RECORD_FILES;
use crate::constants::ORACLE_BACKOFF_BASE;
use crate::constants::ORACLE_BACKOFF_MAX;
use crate::constants::ORACLE_DEADLINE;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value does not parse or violates a bound.
    #[error("invalid configuration for {key}: '{value}' ({reason})")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn env_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: format!("must be a number of seconds: {e}"),
            }),
    }
}

/// Storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of the commit log store.
    pub data_dir: PathBuf,

    /// Path of the signing identity file.
    pub identity_path: PathBuf,
}

impl StorageConfig {
    /// Load storage configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir: PathBuf = std::env::var("CAIRN_DATA_DIR")
            .unwrap_or_else(|_| "./data/cairn".to_string())
            .into();
        let identity_path = std::env::var("CAIRN_IDENTITY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identity.json"));
        Ok(Self {
            data_dir,
            identity_path,
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data/cairn");
        Self {
            identity_path: data_dir.join("identity.json"),
            data_dir,
        }
    }
}

/// Anchor engine timing.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Interval between anchor drop attempts.
    pub drop_interval: Duration,

    /// Interval between confirmation polls.
    pub confirm_interval: Duration,

    /// Deadline applied to every oracle call.
    pub oracle_deadline: Duration,

    /// Base delay of the exponential backoff after oracle failures.
    pub backoff_base: Duration,

    /// Ceiling of the exponential backoff.
    pub backoff_max: Duration,
}

impl AnchorConfig {
    /// Load anchor configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            drop_interval: env_duration_secs("CAIRN_ANCHOR_INTERVAL_SECS", DEFAULT_ANCHOR_INTERVAL)?,
            confirm_interval: env_duration_secs(
                "CAIRN_CONFIRM_INTERVAL_SECS",
                DEFAULT_CONFIRM_INTERVAL,
            )?,
            oracle_deadline: env_duration_secs("CAIRN_ORACLE_DEADLINE_SECS", ORACLE_DEADLINE)?,
            backoff_base: ORACLE_BACKOFF_BASE,
            backoff_max: ORACLE_BACKOFF_MAX,
        })
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            drop_interval: DEFAULT_ANCHOR_INTERVAL,
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
            oracle_deadline: ORACLE_DEADLINE,
            backoff_base: ORACLE_BACKOFF_BASE,
            backoff_max: ORACLE_BACKOFF_MAX,
        }
    }
}

/// Content and referendum policy.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Referendum vote period in seconds.
    pub vote_period_secs: i64,

    /// Maximum number of files per record.
    pub max_files: usize,

    /// Maximum file payload size in bytes.
    pub max_file_size: usize,

    /// Accepted MIME types.
    pub valid_mimes: Vec<String>,
}

impl PolicyConfig {
    /// Load policy configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let vote_period_secs = match std::env::var("CAIRN_VOTE_PERIOD_SECS") {
            Err(_) => DEFAULT_VOTE_PERIOD_SECS,
            Ok(raw) => {
                let parsed: i64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "CAIRN_VOTE_PERIOD_SECS".to_string(),
                    value: raw.clone(),
                    reason: format!("must be a number of seconds: {e}"),
                })?;
                if parsed <= 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "CAIRN_VOTE_PERIOD_SECS".to_string(),
                        value: raw,
                        reason: "vote period must be positive".to_string(),
                    });
                }
                parsed
            }
        };

        Ok(Self {
            vote_period_secs,
            ..Self::default()
        })
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            vote_period_secs: DEFAULT_VOTE_PERIOD_SECS,
            max_files: MAX_RECORD_FILES,
            max_file_size: MAX_FILE_SIZE,
            valid_mimes: DEFAULT_VALID_MIMES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct CairnConfig {
    /// Storage paths.
    pub storage: StorageConfig,

    /// Anchor engine timing.
    pub anchor: AnchorConfig,

    /// Content and referendum policy.
    pub policy: PolicyConfig,
}

impl CairnConfig {
    /// Load the complete configuration from environment variables,
    /// validating every value.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            storage: StorageConfig::load()?,
            anchor: AnchorConfig::load()?,
            policy: PolicyConfig::load()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CairnConfig::default();
        assert_eq!(config.policy.vote_period_secs, DEFAULT_VOTE_PERIOD_SECS);
        assert_eq!(config.policy.max_files, MAX_RECORD_FILES);
        assert!(!config.policy.valid_mimes.is_empty());
        assert!(config.anchor.backoff_base <= config.anchor.backoff_max);
        assert_eq!(
            config.storage.identity_path,
            PathBuf::from("./data/cairn").join("identity.json")
        );
    }
}
