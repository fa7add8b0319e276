//! Staged run arguments
//!
//! The run-start boundary writes a run's arguments to a state store keyed by
//! workflow id; the pipeline reads them back at INIT. The two happen in
//! different tasks, so the read may briefly find nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sourcesense_catalog::SourceScope;
use sourcesense_core::FilterSpec;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State store errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("No staged arguments for workflow '{0}'")]
    NotFound(String),

    #[error("Invalid workflow id '{0}'")]
    InvalidId(String),

    #[error("State store I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Staged arguments for workflow '{workflow_id}' are unreadable: {message}")]
    Parse {
        workflow_id: String,
        message: String,
    },
}

impl StateError {
    /// Not staged yet; the only case worth polling again
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Scope and filter metadata supplied with a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    /// Repository owner for repository sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Database to connect to for relational sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_filter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_filter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_table_regex: Option<String>,
}

impl RunMetadata {
    pub fn scope(&self) -> SourceScope {
        SourceScope {
            owner: self.owner.clone(),
            catalog: self.catalog.clone(),
        }
    }

    /// Filter rules for this run, falling back to `defaults` per pattern
    pub fn filter_spec(&self, defaults: &FilterSpec) -> FilterSpec {
        let pick = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };
        FilterSpec {
            include: pick(&self.include_filter, &defaults.include),
            exclude: pick(&self.exclude_filter, &defaults.exclude),
            temp_table: pick(&self.temp_table_regex, &defaults.temp_table),
        }
    }
}

/// Everything a run needs, as staged by the run-start boundary
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArgs {
    pub workflow_id: String,

    /// Credential payload in either accepted shape
    pub credentials: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_qualified_name: Option<String>,

    #[serde(default)]
    pub metadata: RunMetadata,

    /// Overrides the configured output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<PathBuf>,
}

impl RunArgs {
    pub fn new(workflow_id: impl Into<String>, credentials: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            credentials,
            connection_name: None,
            connection_qualified_name: None,
            metadata: RunMetadata::default(),
            output_prefix: None,
        }
    }

    pub fn with_connection(
        mut self,
        name: impl Into<String>,
        qualified_name: impl Into<String>,
    ) -> Self {
        self.connection_name = Some(name.into());
        self.connection_qualified_name = Some(qualified_name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }
}

impl fmt::Debug for RunArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunArgs")
            .field("workflow_id", &self.workflow_id)
            .field("credentials", &"<redacted>")
            .field("connection_name", &self.connection_name)
            .field("connection_qualified_name", &self.connection_qualified_name)
            .field("metadata", &self.metadata)
            .field("output_prefix", &self.output_prefix)
            .finish()
    }
}

/// Where staged run arguments live
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, workflow_id: &str) -> Result<RunArgs, StateError>;

    async fn put(&self, args: &RunArgs) -> Result<(), StateError>;
}

/// Workflow ids become file names, so keep them to a safe alphabet
fn validate_id(workflow_id: &str) -> Result<(), StateError> {
    let valid = !workflow_id.is_empty()
        && !workflow_id.starts_with('.')
        && workflow_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StateError::InvalidId(workflow_id.to_string()))
    }
}

/// JSON documents under a directory, one per workflow (`<id>.json`)
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str) -> Result<PathBuf, StateError> {
        validate_id(workflow_id)?;
        Ok(self.dir.join(format!("{}.json", workflow_id)))
    }
}

#[async_trait::async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, workflow_id: &str) -> Result<RunArgs, StateError> {
        let path = self.path_for(workflow_id)?;

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(workflow_id.to_string()));
            }
            Err(e) => {
                return Err(StateError::Io {
                    path,
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| StateError::Parse {
            workflow_id: workflow_id.to_string(),
            message: e.to_string(),
        })
    }

    async fn put(&self, args: &RunArgs) -> Result<(), StateError> {
        let path = self.path_for(&args.workflow_id)?;
        let io_error = |path: &Path, e: std::io::Error| StateError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let json = serde_json::to_vec_pretty(args).map_err(|e| StateError::Parse {
            workflow_id: args.workflow_id.clone(),
            message: e.to_string(),
        })?;

        // Readers must never see a half-written document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        tracing::debug!(workflow_id = %args.workflow_id, path = %path.display(), "staged run arguments");
        Ok(())
    }
}

/// In-process store, mainly for tests and single-process deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    runs: Arc<RwLock<HashMap<String, RunArgs>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, workflow_id: &str) -> Result<RunArgs, StateError> {
        self.runs
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(workflow_id.to_string()))
    }

    async fn put(&self, args: &RunArgs) -> Result<(), StateError> {
        validate_id(&args.workflow_id)?;
        self.runs
            .write()
            .await
            .insert(args.workflow_id.clone(), args.clone());
        Ok(())
    }
}
