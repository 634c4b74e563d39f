//! Planner configuration.
//!
//! # Responsibility
//! - Load `PlannerConfig` from TOML with defaults for every field.
//! - Validate values before the service starts.
//! - Build the configured classifier.
//!
//! # Invariants
//! - A validated config has `max_today >= 1` and a non-zero classifier
//!   timeout.

use crate::classifier::{Classifier, HttpClassifier, UnavailableClassifier};
use crate::reconcile::engine::{EngineSettings, TieBreak};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_max_today() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_document_path() -> PathBuf {
    PathBuf::from("state.md")
}

fn default_snapshot_db_path() -> PathBuf {
    PathBuf::from("snapshots.sqlite3")
}

fn default_log_level() -> String {
    crate::logging::default_log_level().to_string()
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config file: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// External classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Endpoint receiving classification requests; `None` disables the
    /// classifier and every reconciliation takes the fallback path.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            api_key_env: None,
        }
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_document_path")]
    pub document_path: PathBuf,
    #[serde(default = "default_snapshot_db_path")]
    pub snapshot_db_path: PathBuf,
    /// Directory receiving `weekly_YYYY-Www.md` summaries.
    #[serde(default)]
    pub summaries_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            snapshot_db_path: default_snapshot_db_path(),
            summaries_dir: None,
        }
    }
}

/// Logging settings; file logging stays off without `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_max_today")]
    pub max_today: usize,
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_today: default_max_today(),
            tie_break: TieBreak::default(),
            classifier: ClassifierConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_today == 0 {
            return Err(ConfigError::Invalid("max_today must be at least 1".to_string()));
        }
        if self.classifier.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "classifier.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(endpoint) = &self.classifier.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "classifier.endpoint cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Joins relative storage and log paths onto `base_dir`.
    pub fn rooted_at(mut self, base_dir: &Path) -> Self {
        let root = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        root(&mut self.storage.document_path);
        root(&mut self.storage.snapshot_db_path);
        if let Some(dir) = self.storage.summaries_dir.as_mut() {
            root(dir);
        }
        if let Some(dir) = self.logging.dir.as_mut() {
            root(dir);
        }
        self
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_today: self.max_today,
            tie_break: self.tie_break,
        }
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier.timeout_ms)
    }

    /// Builds the HTTP classifier when an endpoint is set, otherwise the
    /// always-unavailable one.
    pub fn build_classifier(&self) -> Box<dyn Classifier> {
        match &self.classifier.endpoint {
            Some(endpoint) => {
                let api_key = self
                    .classifier
                    .api_key_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
                    .filter(|key| !key.trim().is_empty());
                Box::new(HttpClassifier::new(
                    endpoint.trim(),
                    self.classifier_timeout(),
                    api_key,
                ))
            }
            None => Box::new(UnavailableClassifier),
        }
    }
}
