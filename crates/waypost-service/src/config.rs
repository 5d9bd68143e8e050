//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote collector settings.
    pub collector: CollectorConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sync pipeline settings.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Collector endpoint is an http/https URL
    /// - Storage path is not empty
    /// - Sync knobs are within reasonable bounds
    ///
    /// # Example
    ///
    /// ```
    /// use waypost_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.collector.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    ///
    /// This is a convenience method that combines `load()` and `validate()`.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Remote collector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collector base URL (e.g., "https://collector.example.com").
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

impl CollectorConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate collector configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "collector.timeout_secs".to_string(),
                message: "timeout cannot be 0".to_string(),
            });
        }

        if self.endpoint.is_empty() {
            errors.push(ValidationError {
                field: "collector.endpoint".to_string(),
                message: "endpoint cannot be empty".to_string(),
            });
        } else if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(ValidationError {
                field: "collector.endpoint".to_string(),
                message: format!(
                    "invalid endpoint '{}': must start with http:// or https://",
                    self.endpoint
                ),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: waypost_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Sync pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum movement in meters before a fix is recorded.
    pub min_distance_m: f64,
    /// Maximum locations per delivery batch.
    pub batch_limit: usize,
    /// Periodic sync interval in minutes.
    pub interval_mins: u64,
    /// Initial retry backoff in seconds.
    pub backoff_secs: u64,
}

/// Minimum periodic interval in minutes.
pub const MIN_SYNC_INTERVAL_MINS: u64 = 1;
/// Maximum periodic interval in minutes (24 hours).
pub const MAX_SYNC_INTERVAL_MINS: u64 = 1440;
/// Maximum locations a single batch may carry.
pub const MAX_BATCH_LIMIT: usize = 500;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_distance_m: waypost_types::geo::DEFAULT_MIN_DISTANCE_M,
            batch_limit: waypost_store::DEFAULT_BATCH_LIMIT,
            interval_mins: 15,
            backoff_secs: 10,
        }
    }
}

impl SyncConfig {
    /// Periodic interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins * 60)
    }

    /// Initial backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.min_distance_m.is_finite() || self.min_distance_m < 0.0 {
            errors.push(ValidationError {
                field: "sync.min_distance_m".to_string(),
                message: format!(
                    "minimum distance {} must be a non-negative number",
                    self.min_distance_m
                ),
            });
        }

        if self.batch_limit == 0 {
            errors.push(ValidationError {
                field: "sync.batch_limit".to_string(),
                message: "batch limit cannot be 0".to_string(),
            });
        } else if self.batch_limit > MAX_BATCH_LIMIT {
            errors.push(ValidationError {
                field: "sync.batch_limit".to_string(),
                message: format!(
                    "batch limit {} is too large (maximum {})",
                    self.batch_limit, MAX_BATCH_LIMIT
                ),
            });
        }

        if self.interval_mins < MIN_SYNC_INTERVAL_MINS {
            errors.push(ValidationError {
                field: "sync.interval_mins".to_string(),
                message: format!(
                    "interval {} is too short (minimum {} minute)",
                    self.interval_mins, MIN_SYNC_INTERVAL_MINS
                ),
            });
        } else if self.interval_mins > MAX_SYNC_INTERVAL_MINS {
            errors.push(ValidationError {
                field: "sync.interval_mins".to_string(),
                message: format!(
                    "interval {} is too long (maximum {} minutes / 24 hours)",
                    self.interval_mins, MAX_SYNC_INTERVAL_MINS
                ),
            });
        }

        if self.backoff_secs == 0 {
            errors.push(ValidationError {
                field: "sync.backoff_secs".to_string(),
                message: "backoff cannot be 0".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `collector.endpoint`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waypost")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.collector.endpoint, "http://127.0.0.1:8080");
        assert_eq!(config.sync.min_distance_m, 10.0);
        assert_eq!(config.sync.batch_limit, 50);
        assert_eq!(config.sync.interval_mins, 15);
        assert_eq!(config.sync.backoff_secs, 10);
    }

    #[test]
    fn test_sync_config_durations() {
        let config = SyncConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, waypost_store::default_db_path());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let config = Config {
            collector: CollectorConfig {
                endpoint: "https://collector.example.com".to_string(),
                timeout_secs: 30,
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/test.db"),
            },
            sync: SyncConfig {
                min_distance_m: 25.0,
                batch_limit: 100,
                interval_mins: 30,
                backoff_secs: 5,
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.collector.endpoint, "https://collector.example.com");
        assert_eq!(loaded.collector.timeout_secs, 30);
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.sync.min_distance_m, 25.0);
        assert_eq!(loaded.sync.batch_limit, 100);
        assert_eq!(loaded.sync.interval_mins, 30);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [collector]
            endpoint = "https://telemetry.example.com"

            [storage]
            path = "/data/waypost.db"

            [sync]
            min_distance_m = 50.0
            batch_limit = 25
            interval_mins = 60
            backoff_secs = 20
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.collector.endpoint, "https://telemetry.example.com");
        assert_eq!(config.storage.path, PathBuf::from("/data/waypost.db"));
        assert_eq!(config.sync.min_distance_m, 50.0);
        assert_eq!(config.sync.batch_limit, 25);
        assert_eq!(config.sync.interval_mins, 60);
        assert_eq!(config.sync.backoff_secs, 20);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [collector]
            endpoint = "https://telemetry.example.com"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.collector.endpoint, "https://telemetry.example.com");
        assert_eq!(config.sync.batch_limit, 50);
        assert_eq!(config.sync.interval_mins, 15);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("waypost/service.toml"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collector_endpoint_validation() {
        let valid = CollectorConfig {
            endpoint: "https://collector.example.com".to_string(),
            ..CollectorConfig::default()
        };
        assert!(valid.validate().is_empty());

        let empty = CollectorConfig {
            endpoint: "".to_string(),
            ..CollectorConfig::default()
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let no_scheme = CollectorConfig {
            endpoint: "collector.example.com".to_string(),
            ..CollectorConfig::default()
        };
        let errors = no_scheme.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("http://"));

        let zero_timeout = CollectorConfig {
            timeout_secs: 0,
            ..CollectorConfig::default()
        };
        let errors = zero_timeout.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("timeout"));
    }

    #[test]
    fn test_storage_path_validation() {
        let valid = StorageConfig {
            path: PathBuf::from("/data/waypost.db"),
        };
        assert!(valid.validate().is_empty());

        let empty = StorageConfig {
            path: PathBuf::new(),
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));
    }

    #[test]
    fn test_sync_config_validation() {
        let valid = SyncConfig::default();
        assert!(valid.validate().is_empty());

        let negative_distance = SyncConfig {
            min_distance_m: -1.0,
            ..SyncConfig::default()
        };
        let errors = negative_distance.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("non-negative"));

        let zero_batch = SyncConfig {
            batch_limit: 0,
            ..SyncConfig::default()
        };
        let errors = zero_batch.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be 0"));

        let huge_batch = SyncConfig {
            batch_limit: 10_000,
            ..SyncConfig::default()
        };
        let errors = huge_batch.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too large"));

        let zero_interval = SyncConfig {
            interval_mins: 0,
            ..SyncConfig::default()
        };
        let errors = zero_interval.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        let huge_interval = SyncConfig {
            interval_mins: 10_000,
            ..SyncConfig::default()
        };
        let errors = huge_interval.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too long"));

        let zero_backoff = SyncConfig {
            backoff_secs: 0,
            ..SyncConfig::default()
        };
        let errors = zero_backoff.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be 0"));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError {
            field: "collector.endpoint".to_string(),
            message: "cannot be empty".to_string(),
        };
        assert_eq!(format!("{}", error), "collector.endpoint: cannot be empty");
    }

    #[test]
    fn test_config_validation_error_display() {
        let errors = vec![
            ValidationError {
                field: "collector.endpoint".to_string(),
                message: "cannot be empty".to_string(),
            },
            ValidationError {
                field: "sync.batch_limit".to_string(),
                message: "cannot be 0".to_string(),
            },
        ];
        let error = ConfigError::Validation(errors);
        let display = format!("{}", error);
        assert!(display.contains("collector.endpoint"));
        assert!(display.contains("sync.batch_limit"));
    }
}
