//! SourceSense engine
//!
//! Runs metadata extraction end to end:
//! - Record transformer (raw records to entities, parent resolution)
//! - Pipeline controller (preflight, level-ordered stages, run report)
//! - Staged run arguments and the startup retry loop
//! - Output sink (Parquet / JSON Lines batches and manifest)
//! - Boundary service (auth check, preflight, run start)

pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod sink;
pub mod state;
pub mod transformer;

pub use error::PipelineError;
pub use mapping::{mapping_for, FieldDefault, FieldError, FieldKind, FieldMapping};
pub use pipeline::{Pipeline, PipelineRun, RunPhase};
pub use retry::{Backoff, RetryPolicy};
pub use service::{PreflightOutcome, RunAcceptance, RunHandle, SourceService, StartRunRequest};
pub use sink::{
    BatchEntry, BatchFormat, BatchWriter, LocalUploader, Manifest, ManifestUploader, OutputSink,
    SinkError, SinkOutput, UploadError,
};
pub use state::{FileStateStore, MemoryStateStore, RunArgs, RunMetadata, StateError, StateStore};
pub use transformer::{DropReason, EntityIndex, RecordTransformer, Transformed};
