//! Output sink adapter
//!
//! Groups entities by type, writes one batch file per type plus a
//! `manifest.json`, and hands the manifest to a [`ManifestUploader`].
//!
//! The batch format is an internal strategy: Parquet by default, JSON Lines
//! where the native Parquet writer is unreliable or when it fails. Text
//! attributes are re-sanitized for the output encoding before anything is
//! written. Identifiers are never rewritten: an entity whose qualified name
//! the output encoding cannot carry is withheld with a diagnostic.

pub mod jsonl;
pub mod manifest;
pub mod parquet;

pub use self::jsonl::JsonlBatchWriter;
pub use self::manifest::{BatchEntry, LocalUploader, Manifest, ManifestUploader, UploadError};
pub use self::parquet::ParquetBatchWriter;

use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sourcesense_core::{
    sanitize_text, Diagnostic, DiagnosticCode, Encoding, Entity, EntityKind, OutputConfig,
    ScalarValue, Severity, WriterStrategy,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File name of the manifest inside a run's output directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Retries after a transient upload failure
pub const UPLOAD_RETRIES: u32 = 3;

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("Manifest upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Sink task failed: {0}")]
    Task(String),
}

impl SinkError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Batch file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFormat {
    Parquet,
    Jsonl,
}

impl BatchFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Jsonl => "jsonl",
        }
    }
}

/// Writes one batch of same-typed entities to a file
pub trait BatchWriter: Send + Sync {
    fn format(&self) -> BatchFormat;

    fn write(&self, path: &Path, entities: &[Entity]) -> Result<(), SinkError>;
}

/// Result of a successful emit
#[derive(Debug, Clone)]
pub struct SinkOutput {
    /// Location returned by the uploader
    pub location: String,

    pub manifest: Manifest,

    /// Fallbacks, withheld entities and write-time sanitization notes
    pub diagnostics: Vec<Diagnostic>,
}

/// Writes entity batches and the manifest for one run
#[derive(Clone)]
pub struct OutputSink {
    primary: Arc<dyn BatchWriter>,
    fallback: Option<Arc<dyn BatchWriter>>,
    encoding: Encoding,
    uploader: Arc<dyn ManifestUploader>,
    upload_policy: RetryPolicy,
}

impl OutputSink {
    pub fn new(strategy: WriterStrategy, encoding: Encoding) -> Self {
        let parquet: Arc<dyn BatchWriter> = Arc::new(ParquetBatchWriter::new());
        let jsonl: Arc<dyn BatchWriter> = Arc::new(JsonlBatchWriter);

        let (primary, fallback) = match strategy {
            WriterStrategy::Parquet => (parquet, None),
            WriterStrategy::Jsonl => (jsonl, None),
            // The native writer can leave zero-byte, lock-held files on Windows
            WriterStrategy::Auto if cfg!(windows) => (jsonl, None),
            WriterStrategy::Auto => (parquet, Some(jsonl)),
        };

        Self {
            primary,
            fallback,
            encoding,
            uploader: Arc::new(LocalUploader),
            upload_policy: RetryPolicy::new(
                UPLOAD_RETRIES + 1,
                Backoff::Exponential {
                    initial: Duration::from_millis(200),
                    max: Duration::from_secs(2),
                },
            ),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.writer, config.encoding)
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ManifestUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    /// Replace the primary writer, keeping the fallback choice
    pub fn with_primary_writer(mut self, writer: Arc<dyn BatchWriter>) -> Self {
        self.primary = writer;
        self
    }

    pub fn with_upload_policy(mut self, policy: RetryPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    /// Write `entities` under `dir` and upload the manifest
    ///
    /// Writing runs on the blocking pool. Only transient upload errors are
    /// retried; nothing here re-runs extraction.
    pub async fn emit(
        &self,
        entities: Vec<Entity>,
        dir: &Path,
        workflow_id: &str,
        run_id: &str,
    ) -> Result<SinkOutput, SinkError> {
        let Prepared {
            batches,
            records: total_records,
            sanitized_fields,
            withheld,
        } = prepare(entities, self.encoding);

        let primary = Arc::clone(&self.primary);
        let fallback = self.fallback.clone();
        let batch_dir = dir.to_path_buf();

        let (entries, mut diagnostics) = tokio::task::spawn_blocking(move || {
            write_batches(&batch_dir, batches, primary.as_ref(), fallback.as_deref())
        })
        .await
        .map_err(|e| SinkError::Task(e.to_string()))??;
        diagnostics.extend(withheld);

        if sanitized_fields > 0 {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::RecordSanitized,
                Severity::Info,
                format!(
                    "{} text fields re-sanitized for {:?} output",
                    sanitized_fields, self.encoding
                ),
            ));
        }

        let manifest = Manifest::new(workflow_id, run_id, total_records, sanitized_fields, entries);
        let manifest_path = dir.join(MANIFEST_FILE);
        manifest.write_to(&manifest_path)?;

        let location = self
            .upload_policy
            .run(
                |_| self.uploader.upload(&manifest_path, &manifest),
                UploadError::is_transient,
                |attempt, delay| {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        uploader = self.uploader.name(),
                        "transient upload failure, retrying"
                    )
                },
            )
            .await?;

        tracing::info!(
            location = %location,
            batches = manifest.batches.len(),
            records = total_records,
            "manifest handed off"
        );

        Ok(SinkOutput {
            location,
            manifest,
            diagnostics,
        })
    }
}

/// Entities ready for the batch writers
struct Prepared {
    batches: BTreeMap<EntityKind, Vec<Entity>>,
    records: u64,
    sanitized_fields: u64,
    withheld: Vec<Diagnostic>,
}

/// Split entities into per-type batches, sanitizing attributes for `encoding`
fn prepare(entities: Vec<Entity>, encoding: Encoding) -> Prepared {
    let mut prepared = Prepared {
        batches: BTreeMap::new(),
        records: 0,
        sanitized_fields: 0,
        withheld: Vec::new(),
    };

    for entity in entities {
        if let Some(field) = unrepresentable_identifier(&entity, encoding) {
            tracing::warn!(
                qualified_name = %entity.qualified_name,
                field,
                "identifier not representable in output encoding, entity withheld"
            );
            prepared.withheld.push(
                Diagnostic::new(
                    DiagnosticCode::RecordInvalid,
                    Severity::Warn,
                    format!(
                        "{} withheld: {} cannot be written as {:?} without changing its identity",
                        entity.kind, field, encoding
                    ),
                )
                .with_entity(entity.qualified_name.clone())
                .with_field(field),
            );
            continue;
        }

        let (entity, fields) = sanitize_entity(entity, encoding);
        prepared.sanitized_fields += fields;
        prepared.records += 1;
        prepared.batches.entry(entity.kind).or_default().push(entity);
    }

    prepared
}

/// First identity field of `entity` that `encoding` cannot carry unchanged
///
/// Descendants embed their ancestors' names in their own qualified names, so
/// withholding an entity withholds its subtree as well.
fn unrepresentable_identifier(entity: &Entity, encoding: Encoding) -> Option<&'static str> {
    [
        ("qualified_name", Some(&entity.qualified_name)),
        ("name", Some(&entity.name)),
        ("parent_qualified_name", entity.parent_qualified_name.as_ref()),
    ]
    .into_iter()
    .find_map(|(field, value)| {
        value
            .filter(|text| !sanitize_text(text, encoding).is_clean())
            .map(|_| field)
    })
}

/// Entity with every text attribute made safe for `encoding`
///
/// Identity fields pass through unchanged.
fn sanitize_entity(entity: Entity, encoding: Encoding) -> (Entity, u64) {
    let mut replaced = 0;
    let mut clean = |text: String| -> String {
        let sanitized = sanitize_text(&text, encoding);
        if sanitized.is_clean() {
            text
        } else {
            replaced += 1;
            sanitized.text.into_owned()
        }
    };

    let entity = Entity {
        kind: entity.kind,
        qualified_name: entity.qualified_name,
        name: entity.name,
        parent_qualified_name: entity.parent_qualified_name,
        attributes: entity
            .attributes
            .into_iter()
            .map(|(key, value)| match value {
                ScalarValue::Text(text) => (key, ScalarValue::Text(clean(text))),
                other => (key, other),
            })
            .collect(),
    };

    (entity, replaced)
}

fn write_batches(
    dir: &Path,
    batches: BTreeMap<EntityKind, Vec<Entity>>,
    primary: &dyn BatchWriter,
    fallback: Option<&dyn BatchWriter>,
) -> Result<(Vec<BatchEntry>, Vec<Diagnostic>), SinkError> {
    std::fs::create_dir_all(dir).map_err(|e| SinkError::io(dir, e))?;

    let mut entries = Vec::with_capacity(batches.len());
    let mut diagnostics = Vec::new();

    for (kind, entities) in batches {
        let (path, format) = match write_one(dir, kind, &entities, primary) {
            Ok(path) => (path, primary.format()),
            Err(e) => {
                let Some(fallback) = fallback else {
                    return Err(e);
                };
                tracing::warn!(
                    type_name = %kind,
                    error = %e,
                    "primary batch writer failed, using fallback"
                );
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::SinkFallback,
                        Severity::Warn,
                        format!(
                            "{} batch written as {} after {} writer failed: {}",
                            kind,
                            fallback.format().extension(),
                            primary.format().extension(),
                            e
                        ),
                    )
                    .with_entity(kind.as_str()),
                );
                (write_one(dir, kind, &entities, fallback)?, fallback.format())
            }
        };

        let contents = std::fs::read(&path).map_err(|e| SinkError::io(&path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(path = %path.display(), records = entities.len(), "wrote batch");
        entries.push(BatchEntry {
            type_name: kind,
            path: file_name,
            format,
            record_count: entities.len() as u64,
            sha256: hex::encode(Sha256::digest(&contents)),
            bytes: contents.len() as u64,
        });
    }

    Ok((entries, diagnostics))
}

/// Write one batch, treating an empty result file as a failed write
fn write_one(
    dir: &Path,
    kind: EntityKind,
    entities: &[Entity],
    writer: &dyn BatchWriter,
) -> Result<PathBuf, SinkError> {
    let path = dir.join(format!("{}.{}", kind.as_str(), writer.format().extension()));

    let result = writer.write(&path, entities).and_then(|()| {
        let bytes = std::fs::metadata(&path)
            .map_err(|e| SinkError::io(&path, e))?
            .len();
        if bytes == 0 {
            return Err(SinkError::Encode {
                path: path.clone(),
                message: "writer produced an empty file".to_string(),
            });
        }
        Ok(())
    });

    if let Err(e) = result {
        // Best effort; the file may not exist
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }
    Ok(path)
}
