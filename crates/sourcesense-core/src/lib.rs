//! SourceSense Core
//!
//! Core domain model for metadata extraction runs: hierarchy levels, raw
//! records, standardized entities, the include/exclude filter engine,
//! credential normalization and the run report.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod credentials;
pub mod diagnostic;
pub mod entity;
pub mod filter;
pub mod report;
pub mod sanitize;

pub use config::{
    Config, ConfigError, OutputConfig, RetryConfig, SourceConfig, StateConfig, TransformConfig,
    WriterStrategy,
};
pub use credentials::{CredentialError, Credentials};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use entity::{
    join_qualified_name, Entity, EntityKind, Level, RawRecord, ScalarValue, SourceConnection,
};
pub use filter::{CompiledFilter, FilterDecision, FilterError, FilterSpec, PatternRole, SYSTEM_CONTAINERS};
pub use report::{FailureKind, ReportVersion, RunFailure, RunReport, RunStatus, StageResult};
pub use sanitize::{sanitize_text, Encoding, Sanitized};
