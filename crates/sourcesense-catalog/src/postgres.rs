//! PostgreSQL source adapter using information_schema
//!
//! This adapter walks databases, schemas, tables and columns through
//! `pg_database` and the information_schema views. It works with:
//! - PostgreSQL 9.4+
//! - Amazon Redshift
//! - Other PostgreSQL-compatible databases
//!
//! Include/exclude patterns are pushed down into the per-level query
//! templates under `queries/postgres/`. The pipeline still evaluates the
//! same filter on every returned record.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = PostgresAdapter::connect(
//!     "localhost", 5432, "mydb", "username", "password", false,
//! ).await?;
//!
//! let adapter = PostgresAdapter::from_connection_string(
//!     "host=localhost port=5432 dbname=mydb user=username password=password"
//! ).await?;
//! ```
//!
//! Reference: https://www.postgresql.org/docs/current/information-schema.html

use crate::adapter::{FetchError, RecordStream, SourceAdapter, SourceConnector, SourceScope};
use crate::template::{QueryTemplate, TemplateParams};
use sourcesense_core::{CompiledFilter, Credentials, Level};

#[cfg(feature = "postgres")]
use futures::{stream, StreamExt, TryStreamExt};

#[cfg(feature = "postgres")]
use sourcesense_core::{RawRecord, ScalarValue};

#[cfg(feature = "postgres")]
use tokio_postgres::{error::SqlState, types::ToSql, types::Type, Client, NoTls, Row};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

/// Levels provided by relational sources, parents first
pub const RELATIONAL_LEVELS: &[Level] = &[Level::Database, Level::Schema, Level::Table, Level::Column];

const DATABASE_QUERY: QueryTemplate =
    QueryTemplate::new("extract_database", include_str!("../queries/postgres/extract_database.sql"));
const SCHEMA_QUERY: QueryTemplate =
    QueryTemplate::new("extract_schema", include_str!("../queries/postgres/extract_schema.sql"));
const TABLE_QUERY: QueryTemplate =
    QueryTemplate::new("extract_table", include_str!("../queries/postgres/extract_table.sql"));
const COLUMN_QUERY: QueryTemplate =
    QueryTemplate::new("extract_column", include_str!("../queries/postgres/extract_column.sql"));

/// PostgreSQL source adapter
///
/// Holds one client connection for the lifetime of the adapter. Dropping the
/// adapter closes the connection.
pub struct PostgresAdapter {
    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Client,

    /// Connection host
    host: String,

    /// Connection port
    port: u16,

    /// Database name
    database: String,
}

impl PostgresAdapter {
    /// Connect with direct credentials
    ///
    /// # Arguments
    ///
    /// * `host` - PostgreSQL server hostname or IP
    /// * `port` - PostgreSQL server port (usually 5432)
    /// * `database` - Database name to connect to
    /// * `user` - Username for authentication
    /// * `password` - Password for authentication
    /// * `tls` - Use a TLS connection
    #[cfg(feature = "postgres")]
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        tls: bool,
    ) -> Result<Self, FetchError> {
        let host = host.into();
        let database = database.into();
        let user: String = user.into();
        let password: String = password.into();

        let mut config = tokio_postgres::Config::new();
        config
            .host(&host)
            .port(port)
            .dbname(&database)
            .user(&user)
            .password(&password)
            .application_name("sourcesense");

        let client = if tls {
            let connector = TlsConnector::builder().build().map_err(|e| {
                FetchError::ConfigError(format!("Failed to create TLS connector: {}", e))
            })?;
            let (client, connection) = config
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(classify_connect_error)?;
            spawn_connection(connection, host.clone(), port);
            client
        } else {
            let (client, connection) = config.connect(NoTls).await.map_err(classify_connect_error)?;
            spawn_connection(connection, host.clone(), port);
            client
        };

        tracing::info!(host = %host, port, database = %database, "connected to PostgreSQL");

        Ok(Self {
            client,
            host,
            port,
            database,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(
        _host: impl Into<String>,
        _port: u16,
        _database: impl Into<String>,
        _user: impl Into<String>,
        _password: impl Into<String>,
        _tls: bool,
    ) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    /// Create adapter from a PostgreSQL connection string
    ///
    /// Supports standard PostgreSQL connection string format:
    /// `host=localhost port=5432 dbname=mydb user=postgres password=secret`
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str) -> Result<Self, FetchError> {
        let config: tokio_postgres::Config = conn_str
            .parse()
            .map_err(|e| FetchError::ConfigError(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.get_ports().first().copied().unwrap_or(5432);
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        let (client, connection) = config.connect(NoTls).await.map_err(classify_connect_error)?;
        spawn_connection(connection, host.clone(), port);

        Ok(Self {
            client,
            host,
            port,
            database,
        })
    }

    /// Create adapter without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    /// Render the extraction query for `level`
    pub fn query_for(level: Level, filter: &CompiledFilter) -> Result<String, FetchError> {
        let template = match level {
            Level::Database => DATABASE_QUERY,
            Level::Schema => SCHEMA_QUERY,
            Level::Table => TABLE_QUERY,
            Level::Column => COLUMN_QUERY,
            Level::Repository => {
                return Err(FetchError::ConfigError(
                    "PostgreSQL sources have no repository level".to_string(),
                ))
            }
        };

        let params = TemplateParams::from_filter(filter)
            .map_err(|e| FetchError::ConfigError(e.to_string()))?;
        template
            .render(&params)
            .map_err(|e| FetchError::ConfigError(e.to_string()))
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the connection port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }
}

#[cfg(feature = "postgres")]
fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>, host: String, port: u16)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(host = %host, port, error = %e, "PostgreSQL connection error");
        }
        tracing::debug!(host = %host, port, "PostgreSQL connection released");
    });
}

#[cfg(not(feature = "postgres"))]
fn not_compiled() -> FetchError {
    FetchError::ConfigError(
        "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres"
            .to_string(),
    )
}

/// Bad credentials are authentication errors; everything else at connect
/// time is treated as connectivity.
#[cfg(feature = "postgres")]
fn classify_connect_error(e: tokio_postgres::Error) -> FetchError {
    match e.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            FetchError::AuthenticationError(e.to_string())
        }
        Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => {
            FetchError::PermissionDenied(e.to_string())
        }
        Some(code) if *code == SqlState::INVALID_CATALOG_NAME => {
            FetchError::NotFound(e.to_string())
        }
        _ => FetchError::NetworkError(e.to_string()),
    }
}

#[cfg(feature = "postgres")]
fn classify_query_error(e: tokio_postgres::Error) -> FetchError {
    if e.is_closed() {
        return FetchError::NetworkError(format!("connection lost: {}", e));
    }
    match e.code() {
        Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => {
            FetchError::PermissionDenied(e.to_string())
        }
        Some(_) => FetchError::QueryError(e.to_string()),
        None => FetchError::NetworkError(e.to_string()),
    }
}

#[cfg(feature = "postgres")]
fn slice_iter<'a>(
    s: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    s.iter().map(|s| *s as _)
}

/// Convert a result row into a raw record
///
/// The templates cast every column to text, int or bool, so other types only
/// appear if a template changes; they map to null.
#[cfg(feature = "postgres")]
fn row_to_record(level: Level, row: &Row) -> Result<RawRecord, FetchError> {
    let mut fields = std::collections::BTreeMap::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::TEXT | Type::VARCHAR | Type::NAME | Type::BPCHAR => row
                .try_get::<_, Option<String>>(idx)
                .map(|v| v.map(ScalarValue::Text)),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)
                .map(|v| v.map(|i| ScalarValue::Int(i64::from(i)))),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)
                .map(|v| v.map(|i| ScalarValue::Int(i64::from(i)))),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(idx)
                .map(|v| v.map(ScalarValue::Int)),
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)
                .map(|v| v.map(ScalarValue::Bool)),
            _ => Ok(None),
        }
        .map_err(|e| {
            FetchError::InvalidRecord(format!("column '{}': {}", column.name(), e))
        })?;

        fields.insert(column.name().to_string(), value.unwrap_or(ScalarValue::Null));
    }

    Ok(RawRecord::new(level, fields))
}

#[async_trait::async_trait]
impl SourceAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn levels(&self) -> &'static [Level] {
        RELATIONAL_LEVELS
    }

    #[cfg(feature = "postgres")]
    fn extract<'a>(&'a self, level: Level, filter: &'a CompiledFilter) -> RecordStream<'a> {
        let query = match Self::query_for(level, filter) {
            Ok(query) => query,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        stream::once(async move {
            self.client
                .query_raw(query.as_str(), slice_iter(&[]))
                .await
                .map_err(classify_query_error)
        })
        .map_ok(move |rows| {
            rows.map(move |row| match row {
                Ok(row) => row_to_record(level, &row),
                Err(e) => Err(classify_query_error(e)),
            })
        })
        .try_flatten()
        .boxed()
    }

    #[cfg(not(feature = "postgres"))]
    fn extract<'a>(&'a self, _level: Level, _filter: &'a CompiledFilter) -> RecordStream<'a> {
        Box::pin(futures::stream::once(async { Err(not_compiled()) }))
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(classify_query_error)?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(not_compiled())
    }
}

/// Opens PostgreSQL adapters from connection settings and run credentials
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub tls: bool,
}

impl PostgresConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: None,
            user: None,
            tls: false,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

#[async_trait::async_trait]
impl SourceConnector for PostgresConnector {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn connect(
        &self,
        credentials: &Credentials,
        scope: &SourceScope,
    ) -> Result<Box<dyn SourceAdapter>, FetchError> {
        let user = credentials
            .username
            .clone()
            .or_else(|| self.user.clone())
            .ok_or_else(|| FetchError::AuthenticationError("username is required".to_string()))?;
        let password = credentials.require_secret()?.to_string();
        let database = scope
            .catalog
            .clone()
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| "postgres".to_string());

        let adapter =
            PostgresAdapter::connect(&self.host, self.port, database, user, password, self.tls)
                .await?;
        Ok(Box::new(adapter))
    }
}
