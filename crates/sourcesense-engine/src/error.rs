//! Pipeline error taxonomy
//!
//! Every run failure is one of these variants. Per-record problems never
//! appear here; they are counted in the stage result and reported as
//! diagnostics.

use crate::sink::SinkError;
use crate::state::StateError;
use sourcesense_catalog::{FetchError, TemplateError};
use sourcesense_core::{CredentialError, DiagnosticCode, FailureKind, FilterError, Level};

/// Errors that end a pipeline run or reject a boundary request
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing or invalid run inputs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Staged run arguments never appeared
    #[error("Run configuration for workflow '{workflow_id}' not available after {attempts} attempts")]
    ConfigUnavailable { workflow_id: String, attempts: u32 },

    /// Rejected or malformed credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Source unreachable or connection lost
    #[error("Source unreachable: {0}")]
    Connectivity(String),

    #[error(transparent)]
    FilterCompilation(#[from] FilterError),

    /// The filtered source scope is empty
    #[error("No source objects at {level} level match the configured filters")]
    EmptyScope { level: Level },

    /// A level failed after extraction started
    #[error("Stage '{level}' failed: {source}")]
    Stage {
        level: Level,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    SinkWrite(#[from] SinkError),
}

impl PipelineError {
    /// Classify a fetch error raised while extracting `level`
    ///
    /// Credential and configuration problems keep their own class so that
    /// callers can tell them apart from connectivity.
    pub fn stage(level: Level, source: FetchError) -> Self {
        match source {
            FetchError::AuthenticationError(_)
            | FetchError::PermissionDenied(_)
            | FetchError::ConfigError(_)
            | FetchError::NotFound(_) => source.into(),
            source => Self::Stage { level, source },
        }
    }

    /// Classify a fetch error raised by the preflight check at `level`
    ///
    /// A lost connection stays connectivity; a rejected query is a
    /// non-retryable failure of that level.
    pub fn preflight(level: Level, source: FetchError) -> Self {
        match source {
            FetchError::NetworkError(_) => source.into(),
            source => Self::stage(level, source),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) | Self::ConfigUnavailable { .. } => FailureKind::Configuration,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::Connectivity(_) => FailureKind::Connectivity,
            Self::FilterCompilation(_) => FailureKind::FilterCompilation,
            Self::EmptyScope { .. } => FailureKind::EmptyScope,
            Self::Stage { .. } => FailureKind::Stage,
            Self::SinkWrite(_) => FailureKind::SinkWrite,
        }
    }

    /// Diagnostic code reported for this failure
    pub fn diagnostic_code(&self) -> DiagnosticCode {
        match self {
            Self::Configuration(_) => DiagnosticCode::ConfigMissing,
            Self::ConfigUnavailable { .. } => DiagnosticCode::ConfigUnavailable,
            Self::Authentication(_) => DiagnosticCode::AuthFailed,
            Self::Connectivity(_) => DiagnosticCode::SourceUnreachable,
            Self::Stage { source, .. } if source.is_retryable() => {
                DiagnosticCode::SourceUnreachable
            }
            Self::Stage { .. } => DiagnosticCode::SourceQueryFailed,
            Self::FilterCompilation(_) => DiagnosticCode::FilterInvalidPattern,
            Self::EmptyScope { .. } => DiagnosticCode::PreflightEmpty,
            Self::SinkWrite(_) => DiagnosticCode::SinkWriteFailed,
        }
    }

    /// Whether the orchestration layer may retry the run
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity(_) => true,
            Self::Stage { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Level the failure is attributed to, if any
    pub fn level(&self) -> Option<Level> {
        match self {
            Self::EmptyScope { level } | Self::Stage { level, .. } => Some(*level),
            _ => None,
        }
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::AuthenticationError(msg) => Self::Authentication(msg),
            FetchError::PermissionDenied(msg) => {
                Self::Authentication(format!("permission denied: {}", msg))
            }
            FetchError::ConfigError(msg) => Self::Configuration(msg),
            FetchError::NotFound(msg) => Self::Configuration(format!("not found: {}", msg)),
            FetchError::NetworkError(msg) => Self::Connectivity(msg),
            // Outside a stage a rejected query points at the run's inputs
            other => Self::Configuration(format!("source rejected request: {}", other)),
        }
    }
}

impl From<CredentialError> for PipelineError {
    fn from(err: CredentialError) -> Self {
        Self::Authentication(err.to_string())
    }
}

impl From<TemplateError> for PipelineError {
    fn from(err: TemplateError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<StateError> for PipelineError {
    fn from(err: StateError) -> Self {
        Self::Configuration(err.to_string())
    }
}
