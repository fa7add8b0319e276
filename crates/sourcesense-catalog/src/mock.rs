//! Mock source adapter for testing
//!
//! This adapter streams predefined records without connecting to any source.
//! It's useful for:
//! - Unit testing filter and transform logic
//! - Integration testing full pipeline runs
//! - Demos without real credentials
//! - Simulating failures at connect, preflight or mid-stream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sourcesense_catalog::{MockAdapterBuilder, SourceAdapter};
//! use sourcesense_core::{Level, RawRecord};
//!
//! let adapter = MockAdapterBuilder::new()
//!     .with_schema("app", "users")
//!     .with_table("app", "users", "accounts")
//!     .build();
//!
//! let records: Vec<_> = adapter.extract(Level::Schema, &filter).collect().await;
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Simulate connection failure
//! let adapter = MockAdapter::new().with_connection_failure();
//! assert!(adapter.test_connection().await.is_err());
//!
//! // Fail the table stage after its records were streamed
//! let adapter = MockAdapterBuilder::new()
//!     .with_stage_error(Level::Table, FetchError::NetworkError("reset".into()))
//!     .build();
//! ```

use crate::adapter::{FetchError, RecordStream, SourceAdapter, SourceConnector, SourceScope};
use crate::postgres::RELATIONAL_LEVELS;
use futures::{stream, StreamExt};
use sourcesense_core::{CompiledFilter, Credentials, Level, RawRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type LevelItems = HashMap<Level, Vec<Result<RawRecord, FetchError>>>;

/// Mock source adapter for testing
///
/// Records are stored per level and streamed in insertion order. Clones share
/// the stored records and counters.
pub struct MockAdapter {
    /// Stream items by level
    records: Arc<RwLock<LevelItems>>,

    /// Errors ending the stream of a level
    stage_errors: Arc<RwLock<HashMap<Level, FetchError>>>,

    /// Number of `extract` calls per level
    extract_calls: Arc<RwLock<HashMap<Level, usize>>>,

    /// Levels reported by `levels()`
    levels: &'static [Level],

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate rejected credentials
    fail_auth: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    /// Name to return from name() method
    adapter_name: &'static str,

    /// Held while a connector-issued adapter is alive
    guard: Option<Arc<ConnectionGuard>>,
}

impl MockAdapter {
    /// Create a new mock adapter with no records
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            stage_errors: Arc::new(RwLock::new(HashMap::new())),
            extract_calls: Arc::new(RwLock::new(HashMap::new())),
            levels: RELATIONAL_LEVELS,
            fail_connection: false,
            fail_auth: false,
            latency_ms: 0,
            adapter_name: "Mock",
            guard: None,
        }
    }

    /// Append a record to its level's stream
    pub async fn add_record(&self, record: RawRecord) {
        self.records
            .write()
            .await
            .entry(record.level)
            .or_default()
            .push(Ok(record));
    }

    /// Append an undecodable record to a level's stream
    pub async fn add_invalid_record(&self, level: Level, message: impl Into<String>) {
        self.records
            .write()
            .await
            .entry(level)
            .or_default()
            .push(Err(FetchError::InvalidRecord(message.into())));
    }

    /// End a level's stream with `error` after its records
    pub async fn add_stage_error(&self, level: Level, error: FetchError) {
        self.stage_errors.write().await.insert(level, error);
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure to reject credentials on connection tests
    pub fn with_auth_failure(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    /// Configure simulated latency before each stream starts
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set a custom adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }

    /// Set the levels this adapter reports
    pub fn with_levels(mut self, levels: &'static [Level]) -> Self {
        self.levels = levels;
        self
    }

    /// Number of stored records (valid or not) at `level`
    pub async fn record_count(&self, level: Level) -> usize {
        self.records
            .read()
            .await
            .get(&level)
            .map_or(0, Vec::len)
    }

    /// Number of times `level` has been extracted
    pub async fn extract_count(&self, level: Level) -> usize {
        self.extract_calls
            .read()
            .await
            .get(&level)
            .copied()
            .unwrap_or(0)
    }

    /// Clear all stored records and stage errors
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.stage_errors.write().await.clear();
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }

    async fn snapshot(&self, level: Level) -> Vec<Result<RawRecord, FetchError>> {
        self.simulate_latency().await;
        *self.extract_calls.write().await.entry(level).or_default() += 1;

        let mut items = self
            .records
            .read()
            .await
            .get(&level)
            .cloned()
            .unwrap_or_default();
        if let Some(error) = self.stage_errors.read().await.get(&level) {
            items.push(Err(error.clone()));
        }
        items
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            stage_errors: Arc::clone(&self.stage_errors),
            extract_calls: Arc::clone(&self.extract_calls),
            levels: self.levels,
            fail_connection: self.fail_connection,
            fail_auth: self.fail_auth,
            latency_ms: self.latency_ms,
            adapter_name: self.adapter_name,
            guard: self.guard.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.adapter_name
    }

    fn levels(&self) -> &'static [Level] {
        self.levels
    }

    fn extract<'a>(&'a self, level: Level, _filter: &'a CompiledFilter) -> RecordStream<'a> {
        stream::once(self.snapshot(level))
            .flat_map(stream::iter)
            .boxed()
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_auth {
            return Err(FetchError::AuthenticationError(
                "Simulated credential rejection".to_string(),
            ));
        }
        if self.fail_connection {
            return Err(FetchError::NetworkError(
                "Simulated connection failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating MockAdapter with predefined records
///
/// # Example
///
/// ```rust,ignore
/// let adapter = MockAdapterBuilder::new()
///     .with_database("app")
///     .with_schema("app", "users")
///     .with_table("app", "users", "accounts")
///     .with_column("app", "users", "accounts", "id")
///     .with_latency(50)
///     .build();
/// ```
pub struct MockAdapterBuilder {
    records: LevelItems,
    stage_errors: HashMap<Level, FetchError>,
    levels: &'static [Level],
    fail_connection: bool,
    fail_auth: bool,
    latency_ms: u64,
    adapter_name: &'static str,
}

impl MockAdapterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            stage_errors: HashMap::new(),
            levels: RELATIONAL_LEVELS,
            fail_connection: false,
            fail_auth: false,
            latency_ms: 0,
            adapter_name: "Mock",
        }
    }

    /// Add an arbitrary record
    pub fn with_record(mut self, record: RawRecord) -> Self {
        self.records.entry(record.level).or_default().push(Ok(record));
        self
    }

    pub fn with_database(self, catalog: &str) -> Self {
        self.with_record(RawRecord::from_pairs(Level::Database, [("catalog_name", catalog)]))
    }

    pub fn with_schema(self, catalog: &str, schema: &str) -> Self {
        self.with_record(RawRecord::from_pairs(
            Level::Schema,
            [("catalog_name", catalog), ("schema_name", schema)],
        ))
    }

    pub fn with_table(self, catalog: &str, schema: &str, table: &str) -> Self {
        self.with_record(RawRecord::from_pairs(
            Level::Table,
            [
                ("table_catalog", catalog),
                ("table_schema", schema),
                ("table_name", table),
                ("table_type", "BASE TABLE"),
            ],
        ))
    }

    pub fn with_column(self, catalog: &str, schema: &str, table: &str, column: &str) -> Self {
        self.with_record(RawRecord::from_pairs(
            Level::Column,
            [
                ("table_catalog", catalog),
                ("table_schema", schema),
                ("table_name", table),
                ("column_name", column),
                ("data_type", "text"),
                ("is_nullable", "YES"),
            ],
        ))
    }

    /// Add a repository owned by `owner`
    pub fn with_repository(self, owner: &str, name: &str) -> Self {
        self.with_record(RawRecord::from_pairs(
            Level::Repository,
            [
                ("owner.login", owner.to_string()),
                ("name", name.to_string()),
                ("full_name", format!("{}/{}", owner, name)),
            ],
        ))
    }

    /// Add an undecodable record at `level`
    pub fn with_invalid_record(mut self, level: Level, message: &str) -> Self {
        self.records
            .entry(level)
            .or_default()
            .push(Err(FetchError::InvalidRecord(message.to_string())));
        self
    }

    /// End the stream of `level` with `error`
    pub fn with_stage_error(mut self, level: Level, error: FetchError) -> Self {
        self.stage_errors.insert(level, error);
        self
    }

    pub fn with_levels(mut self, levels: &'static [Level]) -> Self {
        self.levels = levels;
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure credential rejection
    pub fn with_auth_failure(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set adapter name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.adapter_name = name;
        self
    }

    /// Build the MockAdapter
    pub fn build(self) -> MockAdapter {
        MockAdapter {
            records: Arc::new(RwLock::new(self.records)),
            stage_errors: Arc::new(RwLock::new(self.stage_errors)),
            extract_calls: Arc::new(RwLock::new(HashMap::new())),
            levels: self.levels,
            fail_connection: self.fail_connection,
            fail_auth: self.fail_auth,
            latency_ms: self.latency_ms,
            adapter_name: self.adapter_name,
            guard: None,
        }
    }
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the open-connection count when the last adapter clone drops
struct ConnectionGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connector handing out clones of one [`MockAdapter`]
///
/// Counts connects and currently open connections so tests can verify that
/// every run releases its connection.
#[derive(Clone)]
pub struct MockConnector {
    adapter: MockAdapter,
    connect_error: Option<FetchError>,
    required_token: Option<String>,
    connects: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(adapter: MockAdapter) -> Self {
        Self {
            adapter,
            connect_error: None,
            required_token: None,
            connects: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every connect with `error`
    pub fn with_connect_error(mut self, error: FetchError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Reject connects whose token differs from `token`
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Shared adapter state
    pub fn adapter(&self) -> &MockAdapter {
        &self.adapter
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceConnector for MockConnector {
    fn name(&self) -> &'static str {
        self.adapter.adapter_name
    }

    async fn connect(
        &self,
        credentials: &Credentials,
        _scope: &SourceScope,
    ) -> Result<Box<dyn SourceAdapter>, FetchError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }
        if let Some(expected) = &self.required_token {
            if credentials.require_token()? != expected.as_str() {
                return Err(FetchError::AuthenticationError(
                    "token invalid or expired".to_string(),
                ));
            }
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        let mut adapter = self.adapter.clone();
        adapter.guard = Some(Arc::new(ConnectionGuard {
            open: Arc::clone(&self.open),
        }));
        Ok(Box::new(adapter))
    }
}
