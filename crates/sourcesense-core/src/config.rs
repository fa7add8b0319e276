//! Configuration schema (sourcesense.toml)

use crate::filter::FilterSpec;
use crate::sanitize::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Source connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type (github, postgres, mock)
    #[serde(rename = "type")]
    pub source_type: String,

    /// Connection settings (source-specific)
    #[serde(flatten)]
    pub settings: HashMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: "github".to_string(),
            settings: HashMap::new(),
        }
    }
}

impl SourceConfig {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Output batch writer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterStrategy {
    /// Parquet, except on platforms where the native writer is unreliable
    #[default]
    Auto,

    /// Always Parquet
    Parquet,

    /// Always JSON Lines
    Jsonl,
}

/// Output sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for batches and manifests
    pub dir: PathBuf,

    /// Batch writer selection
    pub writer: WriterStrategy,

    /// Text encoding enforced at write time
    pub encoding: Encoding,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            writer: WriterStrategy::Auto,
            encoding: Encoding::Utf8,
        }
    }
}

/// Record transformer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Text encoding enforced on entity text fields
    pub encoding: Encoding,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Ascii,
        }
    }
}

/// Startup configuration-read retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_secs: 2,
        }
    }
}

/// Run-state store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding staged run arguments
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tenant identifier used in connection qualified names
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Application name used in connection qualified names
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Source connection
    #[serde(default)]
    pub source: SourceConfig,

    /// Default include/exclude rules
    #[serde(default)]
    pub filter: FilterSpec,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub state: StateConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_app_name() -> String {
    "sourcesense".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            app_name: default_app_name(),
            source: SourceConfig::default(),
            filter: FilterSpec::default(),
            output: OutputConfig::default(),
            transform: TransformConfig::default(),
            retry: RetryConfig::default(),
            state: StateConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolve a configured path against the project root
    pub fn resolve_path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Default connection name when the run does not supply one
    pub fn default_connection_name(&self) -> String {
        format!("{}-default", self.app_name)
    }

    /// Default connection qualified name when the run does not supply one
    pub fn default_connection_qualified_name(&self) -> String {
        format!("default/{}/connection", self.app_name)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
