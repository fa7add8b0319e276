//! Test fixtures for source adapter integration tests
//!
//! Reusable record sets shaped like what the PostgreSQL and GitHub adapters
//! return, so filter behavior can be checked without live sources.

use serde_json::{json, Value};
use sourcesense_catalog::{MockAdapter, MockAdapterBuilder};
use sourcesense_core::Level;

/// A small warehouse: two application schemas, a scratch schema and the
/// usual system schemas
pub fn warehouse() -> MockAdapter {
    MockAdapterBuilder::new()
        .with_database("app")
        .with_database("analytics")
        .with_schema("app", "users")
        .with_schema("app", "orders")
        .with_schema("app", "temp_201")
        .with_schema("app", "information_schema")
        .with_schema("app", "pg_catalog")
        .with_schema("analytics", "reporting")
        .with_table("app", "users", "accounts")
        .with_table("app", "users", "tmp_accounts_backup")
        .with_table("app", "orders", "orders")
        .with_table("app", "temp_201", "scratch")
        .with_table("analytics", "reporting", "daily")
        .with_column("app", "users", "accounts", "id")
        .with_column("app", "users", "accounts", "email")
        .with_column("app", "users", "tmp_accounts_backup", "id")
        .with_column("app", "orders", "orders", "id")
        .with_column("analytics", "reporting", "daily", "day")
        .build()
}

/// Repositories of one owner, as listed by the GitHub adapter
pub fn repositories(owner: &str) -> MockAdapter {
    MockAdapterBuilder::new()
        .with_levels(&[Level::Repository])
        .with_name("GitHub")
        .with_repository(owner, "hello-world")
        .with_repository(owner, "spoon-knife")
        .with_repository(owner, "archived-site")
        .build()
}

/// A trimmed `GET /users/{owner}/repos` item
pub fn repository_payload(owner: &str, name: &str) -> Value {
    json!({
        "id": 1296269,
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "private": false,
        "fork": false,
        "html_url": format!("https://github.com/{}/{}", owner, name),
        "description": "This your first repo!",
        "language": "Rust",
        "stargazers_count": 80,
        "watchers_count": 80,
        "forks_count": 9,
        "open_issues_count": 0,
        "topics": ["octocat", "api"],
        "owner": {
            "login": owner,
            "id": 1,
            "type": "User"
        },
        "license": {
            "key": "mit",
            "name": "MIT License"
        }
    })
}
