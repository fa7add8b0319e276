//! Output manifest and the uploader hand-off
//!
//! The manifest is the contract with the external uploader: one entry per
//! entity type with its batch file, format, record count and checksum.

use super::{BatchFormat, SinkError};
use serde::{Deserialize, Serialize};
use sourcesense_core::EntityKind;
use std::path::Path;

/// Manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

/// One batch file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub type_name: EntityKind,

    /// File name relative to the manifest
    pub path: String,

    pub format: BatchFormat,
    pub record_count: u64,

    /// Hex SHA-256 of the file contents
    pub sha256: String,

    pub bytes: u64,
}

/// Batch listing for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub workflow_id: String,
    pub run_id: String,

    /// ISO 8601
    pub created_at: String,

    pub total_records: u64,

    /// Text fields re-sanitized at write time
    pub sanitized_fields: u64,

    pub batches: Vec<BatchEntry>,
}

impl Manifest {
    pub fn new(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        total_records: u64,
        sanitized_fields: u64,
        batches: Vec<BatchEntry>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            total_records,
            sanitized_fields,
            batches,
        }
    }

    pub fn batch(&self, kind: EntityKind) -> Option<&BatchEntry> {
        self.batches.iter().find(|b| b.type_name == kind)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SinkError::encode(path, e))?;
        std::fs::write(path, json).map_err(|e| SinkError::io(path, e))
    }

    pub fn from_file(path: &Path) -> Result<Self, SinkError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SinkError::io(path, e))?;
        serde_json::from_str(&contents).map_err(|e| SinkError::encode(path, e))
    }
}

/// Upload errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadError {
    /// Object-store hiccup; worth another attempt
    #[error("transient: {0}")]
    Transient(String),

    #[error("rejected: {0}")]
    Permanent(String),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// External capability that publishes a written manifest
#[async_trait::async_trait]
pub trait ManifestUploader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Publish the manifest at `path`, returning its final location
    async fn upload(&self, path: &Path, manifest: &Manifest) -> Result<String, UploadError>;
}

/// Leaves the output where it was written
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalUploader;

#[async_trait::async_trait]
impl ManifestUploader for LocalUploader {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, path: &Path, _manifest: &Manifest) -> Result<String, UploadError> {
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = Manifest::new(
            "wf-1",
            "1700000000000",
            2,
            0,
            vec![BatchEntry {
                type_name: EntityKind::Repository,
                path: "Repository.parquet".into(),
                format: BatchFormat::Parquet,
                record_count: 2,
                sha256: "ab".repeat(32),
                bytes: 1024,
            }],
        );

        manifest.write_to(&path).unwrap();
        let loaded = Manifest::from_file(&path).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.batch(EntityKind::Repository).map(|b| b.record_count),
            Some(2)
        );
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"type_name\": \"Repository\""));
        assert!(raw.contains("\"format\": \"parquet\""));
    }
}
