//! Source adapter traits for streaming raw metadata records

use futures::stream::BoxStream;
use futures::StreamExt;
use sourcesense_core::{CompiledFilter, CredentialError, Credentials, Level, RawRecord};

/// Lazy, finite, non-restartable sequence of raw records
///
/// Each call to [`SourceAdapter::extract`] re-issues the query or request.
pub type RecordStream<'a> = BoxStream<'a, Result<RawRecord, FetchError>>;

/// Errors that can occur when talking to a source
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A single record could not be decoded; the stream continues
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FetchError {
    /// Transient failures the orchestration layer may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Failures scoped to one record rather than the whole stream
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::InvalidRecord(_))
    }
}

impl From<CredentialError> for FetchError {
    fn from(err: CredentialError) -> Self {
        Self::AuthenticationError(err.to_string())
    }
}

/// Scope metadata supplied with a run (target owner or catalog)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceScope {
    /// Repository owner (user or organization)
    pub owner: Option<String>,

    /// Database / catalog to connect to
    pub catalog: Option<String>,
}

impl SourceScope {
    pub fn owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            catalog: None,
        }
    }

    pub fn catalog(catalog: impl Into<String>) -> Self {
        Self {
            owner: None,
            catalog: Some(catalog.into()),
        }
    }
}

/// A connected source that can stream records level by level
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Get the adapter name (e.g., "PostgreSQL", "GitHub")
    fn name(&self) -> &'static str;

    /// Levels this source provides, parents before children
    fn levels(&self) -> &'static [Level];

    /// Stream the raw records of one level
    ///
    /// `filter` is offered for source-side pushdown only; callers still
    /// evaluate it on every record.
    fn extract<'a>(&'a self, level: Level, filter: &'a CompiledFilter) -> RecordStream<'a>;

    /// Test the connection to the source
    async fn test_connection(&self) -> Result<(), FetchError>;

    /// Level whose non-emptiness preflight checks
    fn preflight_level(&self) -> Level {
        let levels = self.levels();
        levels
            .iter()
            .copied()
            .find(|level| level.uses_filter_spec())
            .or_else(|| levels.first().copied())
            .unwrap_or(Level::Schema)
    }

    /// Whether at least one record at the preflight level passes `filter`
    ///
    /// Uses the same extraction and predicate as a full run, stopping at the
    /// first match.
    async fn preflight(&self, filter: &CompiledFilter) -> Result<bool, FetchError> {
        any_admitted(self, self.preflight_level(), filter).await
    }
}

/// Scan `level` until a record passes `filter`
pub async fn any_admitted<A>(
    adapter: &A,
    level: Level,
    filter: &CompiledFilter,
) -> Result<bool, FetchError>
where
    A: SourceAdapter + ?Sized,
{
    let mut records = adapter.extract(level, filter);
    while let Some(item) = records.next().await {
        match item {
            Ok(record) if filter.admits(&record) => return Ok(true),
            Ok(_) => {}
            Err(e) if e.is_record_level() => {
                tracing::debug!(level = %level, error = %e, "skipping undecodable record during preflight");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// Opens a connection scope for one run
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    /// Get the connector name
    fn name(&self) -> &'static str;

    /// Open a new adapter; dropping it releases the connection
    async fn connect(
        &self,
        credentials: &Credentials,
        scope: &SourceScope,
    ) -> Result<Box<dyn SourceAdapter>, FetchError>;
}
