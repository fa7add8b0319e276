//! GitHub source adapter using the REST API
//!
//! Lists the repositories of one user or organization through
//! `GET /users/{owner}/repos`, following `Link: rel="next"` headers until the
//! last page. Each repository object is flattened into a raw record
//! (`owner.login`, `name`, `stargazers_count`, ...).
//!
//! ## Authentication
//!
//! A personal access token is sent as `Authorization: Bearer <token>`.
//! [`SourceAdapter::test_connection`] checks it with `GET /user`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let adapter = GitHubAdapter::new(DEFAULT_BASE_URL, "ghp_...", Some("octocat".to_string()))?;
//! adapter.test_connection().await?;
//! ```
//!
//! Reference: https://docs.github.com/en/rest/repos/repos#list-repositories-for-a-user

use crate::adapter::{any_admitted, FetchError, RecordStream, SourceAdapter, SourceConnector, SourceScope};
use crate::flatten::{flatten_json, DEFAULT_MAX_DEPTH};
use sourcesense_core::{CompiledFilter, Credentials, Level, RawRecord};

#[cfg(feature = "github")]
use futures::{stream, StreamExt, TryStreamExt};

/// Public GitHub API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Repositories requested per page (API maximum)
pub const PAGE_SIZE: usize = 100;

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = "sourcesense";

/// Levels provided by GitHub sources
pub const REPOSITORY_LEVELS: &[Level] = &[Level::Repository];

/// GitHub source adapter
pub struct GitHubAdapter {
    /// HTTP client with auth headers (only available with github feature)
    #[cfg(feature = "github")]
    http: reqwest::Client,

    /// API base URL without trailing slash
    base_url: String,

    /// User or organization whose repositories are listed
    owner: Option<String>,
}

impl GitHubAdapter {
    /// Create an adapter authenticated with `token`
    ///
    /// `owner` may be omitted for credential checks; listing and preflight
    /// require it.
    #[cfg(feature = "github")]
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        owner: Option<String>,
    ) -> Result<Self, FetchError> {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            FetchError::AuthenticationError("token contains invalid characters".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            owner: owner.filter(|o| !o.trim().is_empty()),
        })
    }

    /// Create adapter without github feature (returns error)
    #[cfg(not(feature = "github"))]
    pub fn new(
        _base_url: impl Into<String>,
        _token: &str,
        _owner: Option<String>,
    ) -> Result<Self, FetchError> {
        Err(not_compiled())
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn require_owner(&self) -> Result<&str, FetchError> {
        self.owner().ok_or_else(|| {
            FetchError::ConfigError("GitHub 'owner' not found in configuration metadata".to_string())
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// First page of the repository listing
    pub fn repos_url(&self) -> Result<String, FetchError> {
        Ok(format!(
            "{}/users/{}/repos?per_page={}",
            self.base_url,
            self.require_owner()?,
            PAGE_SIZE
        ))
    }

    /// Whether the configured owner exists
    #[cfg(feature = "github")]
    pub async fn check_owner_exists(&self) -> Result<bool, FetchError> {
        let url = format!("{}/users/{}", self.base_url, self.require_owner()?);
        let response = self.send(&url).await?;
        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(status, &url)),
        }
    }

    #[cfg(not(feature = "github"))]
    pub async fn check_owner_exists(&self) -> Result<bool, FetchError> {
        Err(not_compiled())
    }

    #[cfg(feature = "github")]
    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkError(format!("GET {}: {}", url, e)))
    }

    /// Fetch one page and the URL of the next, if any
    #[cfg(feature = "github")]
    async fn fetch_page(
        &self,
        url: &str,
    ) -> Result<(Vec<serde_json::Value>, Option<String>), FetchError> {
        let response = self.send(url).await?;
        let status = response.status().as_u16();
        if !(200..=299).contains(&status) {
            return Err(status_error(status, url));
        }

        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_link);

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("GET {}: {}", url, e)))?;

        match body {
            serde_json::Value::Array(items) => Ok((items, next)),
            other => Err(FetchError::InvalidResponse(format!(
                "expected a JSON array from {}, got {}",
                url,
                json_kind(&other)
            ))),
        }
    }
}

#[cfg(not(feature = "github"))]
fn not_compiled() -> FetchError {
    FetchError::ConfigError(
        "GitHub support not compiled. Rebuild with: cargo build --features github".to_string(),
    )
}

/// Map a non-success HTTP status to a fetch error
pub fn status_error(status: u16, url: &str) -> FetchError {
    match status {
        401 => FetchError::AuthenticationError(
            "The provided personal access token is invalid or expired".to_string(),
        ),
        403 => FetchError::PermissionDenied(format!("GET {} returned 403", url)),
        404 => FetchError::NotFound(url.to_string()),
        429 | 500..=599 => FetchError::NetworkError(format!("GET {} returned {}", url, status)),
        _ => FetchError::QueryError(format!("GET {} returned {}", url, status)),
    }
}

/// Extract the `rel="next"` target from a `Link` header
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        (is_next && !url.is_empty()).then(|| url.to_string())
    })
}

/// Flatten one repository object into a raw record
pub fn repository_record(item: &serde_json::Value) -> Result<RawRecord, FetchError> {
    if !item.is_object() {
        return Err(FetchError::InvalidRecord(format!(
            "expected a repository object, got {}",
            json_kind(item)
        )));
    }
    Ok(RawRecord::new(
        Level::Repository,
        flatten_json(item, DEFAULT_MAX_DEPTH),
    ))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GitHubAdapter {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn levels(&self) -> &'static [Level] {
        REPOSITORY_LEVELS
    }

    #[cfg(feature = "github")]
    fn extract<'a>(&'a self, level: Level, _filter: &'a CompiledFilter) -> RecordStream<'a> {
        if level != Level::Repository {
            return stream::once(async move {
                Err(FetchError::ConfigError(format!(
                    "GitHub sources have no {} level",
                    level
                )))
            })
            .boxed();
        }

        let first = match self.repos_url() {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        stream::try_unfold(Some(first), move |next| async move {
            let Some(url) = next else {
                return Ok::<_, FetchError>(None);
            };
            let (items, next) = self.fetch_page(&url).await?;
            tracing::debug!(url = %url, count = items.len(), has_next = next.is_some(), "fetched repository page");
            let records = items.into_iter().map(|item| repository_record(&item));
            Ok(Some((stream::iter(records), next)))
        })
        .try_flatten()
        .boxed()
    }

    #[cfg(not(feature = "github"))]
    fn extract<'a>(&'a self, _level: Level, _filter: &'a CompiledFilter) -> RecordStream<'a> {
        Box::pin(futures::stream::once(async { Err(not_compiled()) }))
    }

    #[cfg(feature = "github")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        let url = format!("{}/user", self.base_url);
        let response = self.send(&url).await?;
        let status = response.status().as_u16();
        if (200..=299).contains(&status) {
            Ok(())
        } else {
            Err(status_error(status, &url))
        }
    }

    #[cfg(not(feature = "github"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(not_compiled())
    }

    async fn preflight(&self, filter: &CompiledFilter) -> Result<bool, FetchError> {
        let owner = self.require_owner()?;
        if !self.check_owner_exists().await? {
            return Err(FetchError::NotFound(format!(
                "GitHub user or organization '{}' not found",
                owner
            )));
        }
        tracing::info!(owner = %owner, "GitHub owner exists");
        any_admitted(self, Level::Repository, filter).await
    }
}

/// Opens GitHub adapters from a token and the run's scope
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    pub base_url: String,
}

impl GitHubConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for GitHubConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl SourceConnector for GitHubConnector {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    async fn connect(
        &self,
        credentials: &Credentials,
        scope: &SourceScope,
    ) -> Result<Box<dyn SourceAdapter>, FetchError> {
        let token = credentials.require_token()?;
        Ok(Box::new(GitHubAdapter::new(
            &self.base_url,
            token,
            scope.owner.clone(),
        )?))
    }
}
