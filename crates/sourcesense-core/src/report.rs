//! Run report schema (stable v1)
//!
//! The report is the only externally observable output of a pipeline run.
//! Breaking changes require a new version.

use crate::diagnostic::{Diagnostic, Severity};
use crate::entity::Level;
use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Failure classes a caller can act on
///
/// `EmptyScope` is a usage problem (nothing matched the filters);
/// `Authentication` and `Connectivity` are environment problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    FilterCompilation,
    Authentication,
    Connectivity,
    EmptyScope,
    Stage,
    SinkWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::FilterCompilation => "filter_compilation",
            Self::Authentication => "authentication",
            Self::Connectivity => "connectivity",
            Self::EmptyScope => "empty_scope",
            Self::Stage => "stage",
            Self::SinkWrite => "sink_write",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,

    /// Whether the orchestration layer may re-invoke the run
    pub retryable: bool,

    /// Level being extracted when the failure occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
}

/// Statistics for one hierarchy level's extract-filter-transform pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub level: Level,

    /// Raw records received from the source
    pub records_in: u64,

    /// Entities produced
    pub records_out: u64,

    /// Records rejected by the filter engine
    pub filtered: u64,

    /// Records dropped because their parent was not produced
    pub orphaned: u64,

    /// Records dropped for mapping or decode errors
    pub errored: u64,

    /// Text fields that needed character replacement
    pub sanitized_fields: u64,

    pub duration_ms: u64,

    /// First [`StageResult::MAX_ERRORS`] error messages
    pub errors: Vec<String>,
}

impl StageResult {
    /// Cap on retained error messages per stage
    pub const MAX_ERRORS: usize = 20;

    pub fn new(level: Level) -> Self {
        Self {
            level,
            records_in: 0,
            records_out: 0,
            filtered: 0,
            orphaned: 0,
            errored: 0,
            sanitized_fields: 0,
            duration_ms: 0,
            errors: Vec::new(),
        }
    }

    /// Keep an error message if the cap has not been reached
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.errors.len() < Self::MAX_ERRORS {
            self.errors.push(message.into());
        }
    }

    /// Records dropped for any reason other than filtering
    pub fn dropped(&self) -> u64 {
        self.orphaned + self.errored
    }
}

/// Run report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub version: ReportVersion,

    pub workflow_id: String,
    pub run_id: String,

    /// Timestamps (ISO 8601)
    pub started_at: String,
    pub finished_at: String,

    pub status: RunStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,

    /// Stage statistics in execution order
    pub stages: Vec<StageResult>,

    /// Total entities handed to the sink
    pub entity_count: u64,

    /// Location of the output manifest, when the sink succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_location: Option<String>,

    /// Record- and run-level diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn is_retryable(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.retryable)
    }

    pub fn stage(&self, level: Level) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.level == level)
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warn)
            .count()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
