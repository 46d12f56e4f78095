//! Configuration module for RecordKeeper.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::MAX_RETENTION_PERIOD_DAYS;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for RecordKeeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retention: RetentionConfig,
    pub consent: ConsentConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Retention and sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Retention period applied when a record is created without one.
    pub default_retention_period_days: u32,
    /// Seconds between retention sweeps.
    pub sweep_interval_seconds: u64,
}

/// Consent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Consent schema version stamped on claims that carry none.
    pub schema_version: String,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/recordkeeper/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("recordkeeper")
            .join("config.yaml")
    }

    /// Interval between retention sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_seconds)
    }

    /// Defaults applied to new records.
    pub fn record_defaults(&self) -> RecordDefaults {
        RecordDefaults {
            retention_period_days: self.retention.default_retention_period_days,
            consent_version: self.consent.schema_version.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            // Seven years.
            default_retention_period_days: 2555,
            sweep_interval_seconds: 3600,
        }
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("recordkeeper")
                .join("records.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Values stamped onto new records when the caller leaves them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub retention_period_days: u32,
    pub consent_version: String,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Config::default().record_defaults()
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retention.sweep_interval_seconds"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- retention ---
        if self.retention.default_retention_period_days == 0 {
            errors.push(ValidationError {
                field: "retention.default_retention_period_days".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.retention.default_retention_period_days > MAX_RETENTION_PERIOD_DAYS {
            errors.push(ValidationError {
                field: "retention.default_retention_period_days".into(),
                message: format!("must be at most {}", MAX_RETENTION_PERIOD_DAYS),
            });
        }
        if self.retention.sweep_interval_seconds == 0 {
            errors.push(ValidationError {
                field: "retention.sweep_interval_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- consent ---
        if self.consent.schema_version.trim().is_empty() {
            errors.push(ValidationError {
                field: "consent.schema_version".into(),
                message: "must not be empty".into(),
            });
        }

        // --- storage ---
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use recordkeeper_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .default_retention_period_days(365)
///     .sweep_interval_seconds(600)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.retention.default_retention_period_days, 365);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- retention ---

    pub fn default_retention_period_days(mut self, days: u32) -> Self {
        self.config.retention.default_retention_period_days = days;
        self
    }

    pub fn sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.retention.sweep_interval_seconds = seconds;
        self
    }

    // --- consent ---

    pub fn consent_schema_version(mut self, version: impl Into<String>) -> Self {
        self.config.consent.schema_version = version.into();
        self
    }

    // --- storage ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.retention.default_retention_period_days, 2555);
        assert_eq!(cfg.retention.sweep_interval_seconds, 3600);
        assert_eq!(cfg.consent.schema_version, "1.0");
        assert!(cfg
            .storage
            .database_path
            .to_string_lossy()
            .ends_with("records.db"));
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    #[test]
    fn oversized_retention_fails_validation() {
        let cfg = ConfigBuilder::new()
            .default_retention_period_days(MAX_RETENTION_PERIOD_DAYS + 1)
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retention.default_retention_period_days");

        let cfg = ConfigBuilder::new()
            .default_retention_period_days(MAX_RETENTION_PERIOD_DAYS)
            .build();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn record_defaults_follow_config() {
        let cfg = ConfigBuilder::new()
            .default_retention_period_days(30)
            .consent_schema_version("2024-03")
            .build();
        let defaults = cfg.record_defaults();
        assert_eq!(defaults.retention_period_days, 30);
        assert_eq!(defaults.consent_version, "2024-03");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
retention:
  default_retention_period_days: 90
  sweep_interval_seconds: 60
consent:
  schema_version: "2.0"
storage:
  database_path: /tmp/recordkeeper-test.db
logging:
  level: debug
  json: true
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.retention.default_retention_period_days, 90);
        assert_eq!(cfg.retention.sweep_interval_seconds, 60);
        assert_eq!(cfg.consent.schema_version, "2.0");
        assert_eq!(
            cfg.storage.database_path,
            PathBuf::from("/tmp/recordkeeper-test.db")
        );
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"retention:\n  sweep_interval_seconds: 15\n")
            .unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.retention.sweep_interval_seconds, 15);
        assert_eq!(cfg.retention.default_retention_period_days, 2555);
        assert_eq!(cfg.consent.schema_version, "1.0");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.retention.sweep_interval_seconds, 3600);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_values() {
        let mut cfg = Config::default();
        cfg.retention.default_retention_period_days = 0;
        cfg.retention.sweep_interval_seconds = 0;
        let errors = cfg.validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"retention.default_retention_period_days"));
        assert!(fields.contains(&"retention.sweep_interval_seconds"));
    }

    #[test]
    fn validate_catches_blank_schema_version() {
        let mut cfg = Config::default();
        cfg.consent.schema_version = "  ".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "consent.schema_version"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn build_validated_reports_errors() {
        let result = ConfigBuilder::new().sweep_interval_seconds(0).build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "retention.sweep_interval_seconds: must be greater than 0"
        );
    }
}
