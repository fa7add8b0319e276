//! Test fixtures for pipeline tests
//!
//! Mock sources, a state store whose arguments appear late, a failing batch
//! writer, and helpers to read a run's output back.

#![allow(dead_code)]

use serde_json::{json, Value};
use sourcesense_catalog::{MockAdapter, MockAdapterBuilder, MockConnector};
use sourcesense_core::{Config, Entity, WriterStrategy};
use sourcesense_engine::{
    BatchFormat, BatchWriter, Manifest, MemoryStateStore, Pipeline, RunArgs, RunMetadata,
    SinkError, StateError, StateStore,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TOKEN: &str = "ghp_fixture_token";

/// Two databases with application, scratch and system schemas, plus a table
/// whose schema is never produced
pub fn warehouse() -> MockAdapterBuilder {
    MockAdapterBuilder::new()
        .with_database("app")
        .with_database("analytics")
        .with_database("sys")
        .with_schema("app", "users")
        .with_schema("app", "orders")
        .with_schema("app", "temp_201")
        .with_schema("app", "information_schema")
        .with_schema("sys", "internal")
        .with_schema("analytics", "reporting")
        .with_table("app", "users", "accounts")
        .with_table("app", "users", "tmp_accounts_backup")
        .with_table("app", "orders", "orders")
        .with_table("app", "temp_201", "scratch")
        .with_table("app", "missing_db", "ghost")
        .with_table("analytics", "reporting", "daily")
        .with_column("app", "users", "accounts", "id")
        .with_column("app", "users", "accounts", "email")
        .with_column("app", "orders", "orders", "id")
        .with_column("app", "missing_db", "ghost", "id")
        .with_column("analytics", "reporting", "daily", "day")
}

pub fn connector(adapter: MockAdapter) -> MockConnector {
    MockConnector::new(adapter).with_required_token(TOKEN)
}

/// Config writing JSON Lines under `output`
pub fn config(output: &Path) -> Config {
    let mut config = Config::default();
    config.project_root = output.to_path_buf();
    config.output.dir = output.join("output");
    config.output.writer = WriterStrategy::Jsonl;
    config.state.dir = output.join("state");
    config
}

pub fn pipeline(
    config: Config,
    connector: MockConnector,
    store: Arc<dyn StateStore>,
) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(config, Arc::new(connector), store))
}

pub fn flat_credentials() -> Value {
    json!({ "token": TOKEN })
}

pub fn nested_credentials() -> Value {
    json!({ "credentials": { "token": TOKEN } })
}

pub fn filters(include: &str, exclude: &str) -> RunMetadata {
    RunMetadata {
        catalog: Some("app".to_string()),
        include_filter: Some(include.to_string()),
        exclude_filter: Some(exclude.to_string()),
        ..RunMetadata::default()
    }
}

pub fn run_args(workflow_id: &str, metadata: RunMetadata) -> RunArgs {
    RunArgs::new(workflow_id, flat_credentials())
        .with_connection("warehouse", "default/sourcesense/1700000000")
        .with_metadata(metadata)
}

/// Store that reports nothing staged until the `available_on`-th read
pub struct DelayedStore {
    inner: MemoryStateStore,
    available_on: Option<usize>,
    reads: AtomicUsize,
}

impl DelayedStore {
    pub fn available_on(read: usize) -> Self {
        Self {
            inner: MemoryStateStore::new(),
            available_on: Some(read),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn never() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            available_on: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StateStore for DelayedStore {
    async fn get(&self, workflow_id: &str) -> Result<RunArgs, StateError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        match self.available_on {
            Some(available_on) if read >= available_on => self.inner.get(workflow_id).await,
            _ => Err(StateError::NotFound(workflow_id.to_string())),
        }
    }

    async fn put(&self, args: &RunArgs) -> Result<(), StateError> {
        self.inner.put(args).await
    }
}

/// Batch writer that always fails
pub struct BrokenWriter;

impl BatchWriter for BrokenWriter {
    fn format(&self) -> BatchFormat {
        BatchFormat::Parquet
    }

    fn write(&self, path: &Path, _entities: &[Entity]) -> Result<(), SinkError> {
        Err(SinkError::Io {
            path: path.to_path_buf(),
            message: "disk full".to_string(),
        })
    }
}

/// All entities listed by the manifest at `location`
pub fn read_entities(location: &str) -> Vec<Entity> {
    let manifest_path = Path::new(location);
    let manifest = Manifest::from_file(manifest_path).unwrap();
    let dir = manifest_path.parent().unwrap();

    manifest
        .batches
        .iter()
        .flat_map(|batch| {
            assert_eq!(batch.format, BatchFormat::Jsonl, "fixture reads JSON Lines only");
            let contents = std::fs::read_to_string(dir.join(&batch.path)).unwrap();
            contents
                .lines()
                .map(|line| serde_json::from_str::<Entity>(line).unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}
