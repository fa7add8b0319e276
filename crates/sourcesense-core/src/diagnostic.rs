//! Diagnostic codes and run diagnostics
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use crate::entity::Level;
use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Configuration (1xxx)
    /// A required run input is missing or invalid
    ConfigMissing,

    /// An include/exclude pattern does not compile
    FilterInvalidPattern,

    /// Staged run configuration never became available
    ConfigUnavailable,

    // Source access (2xxx)
    /// Credentials were rejected by the source
    AuthFailed,

    /// Source could not be reached or the connection dropped
    SourceUnreachable,

    /// The source rejected a metadata query or returned an unusable response
    SourceQueryFailed,

    /// Preflight found no matching source objects
    PreflightEmpty,

    // Records (3xxx)
    /// A required field is absent from a raw record
    RecordMissingField,

    /// A record's parent was not produced in this run
    RecordOrphanedParent,

    /// Text characters were replaced during sanitization
    RecordSanitized,

    /// The source returned a record that could not be decoded
    RecordInvalid,

    // Output (4xxx)
    /// Writing or uploading the output failed
    SinkWriteFailed,

    /// The native columnar writer was bypassed for the fallback writer
    SinkFallback,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::FilterInvalidPattern => "FILTER_INVALID_PATTERN",
            Self::ConfigUnavailable => "CONFIG_UNAVAILABLE",
            Self::AuthFailed => "AUTH_FAILED",
            Self::SourceUnreachable => "SOURCE_UNREACHABLE",
            Self::SourceQueryFailed => "SOURCE_QUERY_FAILED",
            Self::PreflightEmpty => "PREFLIGHT_EMPTY",
            Self::RecordMissingField => "RECORD_MISSING_FIELD",
            Self::RecordOrphanedParent => "RECORD_ORPHANED_PARENT",
            Self::RecordSanitized => "RECORD_SANITIZED",
            Self::RecordInvalid => "RECORD_INVALID",
            Self::SinkWriteFailed => "SINK_WRITE_FAILED",
            Self::SinkFallback => "SINK_FALLBACK",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - record-level problem, run continues
    Warn,

    /// Error - run-level problem
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Hierarchy level the diagnostic was raised at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Identity of the affected entity or record (qualified name or key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Field involved, for record-level diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            level: None,
            entity: None,
            field: None,
        }
    }

    /// Set the level
    pub fn at_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the affected entity
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the affected field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}
