//! Source adapters for metadata extraction
//!
//! This crate provides the raw extractor: adapters that issue one query or
//! paginated API walk per hierarchy level and stream back flat
//! [`RawRecord`](sourcesense_core::RawRecord)s.
//!
//! ## Features
//!
//! Enable source support via Cargo features:
//! - `github` - GitHub repositories via the REST API
//! - `postgres` - PostgreSQL/Redshift via information_schema
//! - `all-sources` - All source adapters
//!
//! The in-memory [`MockAdapter`] is always available.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sourcesense_catalog::{GitHubConnector, SourceConnector, SourceScope};
//!
//! let connector = GitHubConnector::new("https://api.github.com");
//! let adapter = connector.connect(&credentials, &SourceScope::owner("octocat")).await?;
//! adapter.test_connection().await?;
//! ```

pub mod adapter;
pub mod flatten;
pub mod github;
pub mod mock;
pub mod postgres;
pub mod template;

pub use adapter::{FetchError, RecordStream, SourceAdapter, SourceConnector, SourceScope};
pub use flatten::{flatten_json, DEFAULT_MAX_DEPTH};
pub use github::{GitHubAdapter, GitHubConnector, DEFAULT_BASE_URL};
pub use mock::{MockAdapter, MockAdapterBuilder, MockConnector};
pub use postgres::{PostgresAdapter, PostgresConnector};
pub use template::{QueryTemplate, TemplateError, TemplateParams};
