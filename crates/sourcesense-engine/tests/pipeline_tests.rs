//! End-to-end pipeline tests against mock sources
//!
//! ```bash
//! cargo test -p sourcesense-engine --test pipeline_tests
//! ```

mod fixtures;

use fixtures::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use sourcesense_catalog::{FetchError, MockAdapterBuilder, SourceAdapter};
use sourcesense_core::{
    DiagnosticCode, Encoding, Entity, EntityKind, FailureKind, FilterSpec, Level, RunReport,
    ScalarValue, WriterStrategy,
};
use sourcesense_engine::{
    MemoryStateStore, OutputSink, RunAcceptance, RunMetadata, RunPhase, SourceService,
    StartRunRequest, StateStore,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

// =============================================================================
// Helper Functions
// =============================================================================

fn names_of(entities: &[Entity], kind: EntityKind) -> BTreeSet<String> {
    entities
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.name.clone())
        .collect()
}

fn diagnostics_with(report: &RunReport, code: DiagnosticCode) -> usize {
    report.diagnostics.iter().filter(|d| d.code == code).count()
}

async fn stage_and_run(
    store: Arc<MemoryStateStore>,
    pipeline: &sourcesense_engine::Pipeline,
    workflow_id: &str,
    metadata: RunMetadata,
) -> RunReport {
    store.put(&run_args(workflow_id, metadata)).await.unwrap();
    pipeline.run(workflow_id).await
}

// =============================================================================
// Filtering and hierarchy
// =============================================================================

#[tokio::test]
async fn schema_scenario_keeps_only_included_application_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let report = stage_and_run(store, &pipeline, "wf-scenario", filters(r"app\..*", "temp_.*")).await;

    assert!(report.succeeded(), "{:?}", report.failure);
    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    assert_eq!(
        names_of(&entities, EntityKind::Schema),
        BTreeSet::from(["orders".to_string(), "users".to_string()])
    );

    let schemas = report.stage(Level::Schema).unwrap();
    assert_eq!(schemas.records_in, 6);
    assert_eq!(schemas.records_out, 2);
    assert_eq!(schemas.filtered, 4);
}

#[tokio::test]
async fn table_under_missing_schema_is_dropped_as_orphan() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let report = stage_and_run(store, &pipeline, "wf-orphan", RunMetadata::default()).await;
    assert!(report.succeeded());

    let tables = report.stage(Level::Table).unwrap();
    assert_eq!(tables.orphaned, 1);
    assert_eq!(tables.errored, 0);
    assert!(tables.errors.iter().any(|e| e.starts_with("orphaned parent")));

    let orphan = report
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::RecordOrphanedParent && d.level == Some(Level::Table))
        .unwrap();
    assert!(orphan.message.starts_with("orphaned parent"));
    assert!(orphan.entity.as_deref().unwrap().ends_with("/app/missing_db/ghost"));

    // The ghost table's column is orphaned in turn
    assert_eq!(report.stage(Level::Column).unwrap().orphaned, 1);

    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    assert!(!names_of(&entities, EntityKind::Table).contains("ghost"));
}

#[tokio::test]
async fn output_has_no_dangling_parents() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let metadata = RunMetadata {
        temp_table_regex: Some("tmp_.*".into()),
        ..filters(r"app\..*", "temp_.*")
    };
    let report = stage_and_run(store, &pipeline, "wf-parents", metadata).await;
    assert!(report.succeeded());

    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    let names: HashSet<&str> = entities.iter().map(|e| e.qualified_name.as_str()).collect();
    for entity in &entities {
        match (&entity.parent_qualified_name, entity.kind) {
            (None, EntityKind::Database) => {}
            (Some(parent), _) => assert!(
                names.contains(parent.as_str()),
                "{} references missing parent {}",
                entity.qualified_name,
                parent
            ),
            (None, kind) => panic!("{} entity {} has no parent", kind, entity.qualified_name),
        }
    }

    assert!(!names_of(&entities, EntityKind::Table).contains("tmp_accounts_backup"));
    assert_eq!(report.stage(Level::Table).unwrap().filtered, 3);
}

#[tokio::test]
async fn narrower_output_encoding_never_merges_identities() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let mut config = config(dir.path());
    config.transform.encoding = Encoding::Utf8;
    config.output.encoding = Encoding::Ascii;
    let adapter = warehouse()
        .with_schema("app", "caf\u{e9}")
        .with_schema("app", "caf\u{e8}")
        .with_table("app", "caf\u{e9}", "ledger")
        .build();
    let pipeline = pipeline(config, connector(adapter), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-encodings", filters(r"app\..*", "temp_.*")).await;
    assert!(report.succeeded(), "{:?}", report.failure);

    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    let names: HashSet<&str> = entities.iter().map(|e| e.qualified_name.as_str()).collect();
    assert_eq!(names.len(), entities.len());
    assert!(entities.iter().all(|e| !e.qualified_name.contains('?')));
    assert_eq!(
        names_of(&entities, EntityKind::Schema),
        BTreeSet::from(["orders".to_string(), "users".to_string()])
    );
    assert!(!names_of(&entities, EntityKind::Table).contains("ledger"));

    let withheld: BTreeSet<String> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagnosticCode::RecordInvalid)
        .filter_map(|d| d.entity.as_deref())
        .filter_map(|qn| qn.split_once("/app/").map(|(_, rest)| rest.to_string()))
        .collect();
    assert_eq!(
        withheld,
        BTreeSet::from([
            "caf\u{e9}".to_string(),
            "caf\u{e8}".to_string(),
            "caf\u{e9}/ledger".to_string(),
        ])
    );
}

#[tokio::test]
async fn child_counts_are_computed_from_transformed_children() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let report = stage_and_run(store, &pipeline, "wf-counts", filters(r"app\..*", "temp_.*")).await;
    let entities = read_entities(report.manifest_location.as_deref().unwrap());

    let find = |suffix: &str| {
        entities
            .iter()
            .find(|e| e.qualified_name.ends_with(suffix))
            .unwrap()
    };
    assert_eq!(find("/app").attribute("schemaCount"), Some(&ScalarValue::Int(2)));
    assert_eq!(find("/app/users").attribute("tableCount"), Some(&ScalarValue::Int(2)));
    assert_eq!(
        find("/app/users/accounts").attribute("columnCount"),
        Some(&ScalarValue::Int(2))
    );
    assert_eq!(
        find("/app/users/tmp_accounts_backup").attribute("columnCount"),
        Some(&ScalarValue::Int(0))
    );
}

#[tokio::test]
async fn identical_input_yields_identical_qualified_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store,
    );

    let mut graphs = Vec::new();
    for workflow_id in ["wf-det-1", "wf-det-2"] {
        let report = pipeline
            .run_with_args(run_args(workflow_id, RunMetadata::default()))
            .await;
        assert!(report.succeeded());
        let entities = read_entities(report.manifest_location.as_deref().unwrap());
        let graph: BTreeSet<(String, Option<String>)> = entities
            .into_iter()
            .map(|e| (e.qualified_name, e.parent_qualified_name))
            .collect();
        graphs.push(graph);
    }

    assert_eq!(graphs[0], graphs[1]);
    assert!(graphs[0].contains(&(
        "default/sourcesense/1700000000/app/users/accounts/email".to_string(),
        Some("default/sourcesense/1700000000/app/users/accounts".to_string()),
    )));
}

#[tokio::test]
async fn undecodable_records_are_counted_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let adapter = warehouse()
        .with_invalid_record(Level::Table, "invalid byte sequence for encoding UTF8")
        .build();
    let pipeline = pipeline(config(dir.path()), connector(adapter), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-invalid", RunMetadata::default()).await;

    assert!(report.succeeded());
    assert_eq!(report.stage(Level::Table).unwrap().errored, 1);
    assert_eq!(diagnostics_with(&report, DiagnosticCode::RecordInvalid), 1);
}

// =============================================================================
// Preflight
// =============================================================================

#[tokio::test]
async fn preflight_agrees_with_full_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = warehouse().build();
    let pipeline = pipeline(
        config(dir.path()),
        connector(adapter.clone()),
        Arc::new(MemoryStateStore::new()),
    );
    let service = SourceService::new(pipeline);

    for (include, exclude) in [
        ("", ""),
        (r"app\..*", "temp_.*"),
        ("reporting", ""),
        ("nothing_here", ""),
        ("", ".*"),
        ("temp_.*", "temp_.*"),
    ] {
        let payload = json!({
            "token": TOKEN,
            "metadata": { "include_filter": include, "exclude_filter": exclude }
        });
        let outcome = service.preflight_check(&payload).await;

        let filter = FilterSpec::new(include, exclude).compile().unwrap();
        let admitted = adapter
            .extract(Level::Schema, &filter)
            .filter(|item| {
                let admitted = matches!(item, Ok(record) if filter.admits(record));
                async move { admitted }
            })
            .count()
            .await;

        assert_eq!(
            outcome.success,
            admitted > 0,
            "include={include:?} exclude={exclude:?}: {}",
            outcome.message
        );
        if !outcome.success {
            assert_eq!(outcome.failure, Some(FailureKind::EmptyScope));
        }
    }
}

#[tokio::test]
async fn empty_scope_is_distinct_from_connectivity_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());

    let empty = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );
    let empty_report =
        stage_and_run(store.clone(), &empty, "wf-empty", filters("nothing_here", "")).await;

    let unreachable = pipeline(
        config(dir.path()),
        connector(warehouse().build())
            .with_connect_error(FetchError::NetworkError("connection refused".into())),
        store.clone(),
    );
    let unreachable_report =
        stage_and_run(store, &unreachable, "wf-unreachable", RunMetadata::default()).await;

    let empty_failure = empty_report.failure.clone().unwrap();
    let unreachable_failure = unreachable_report.failure.clone().unwrap();

    assert_eq!(empty_failure.kind, FailureKind::EmptyScope);
    assert!(!empty_failure.retryable);
    assert_eq!(diagnostics_with(&empty_report, DiagnosticCode::PreflightEmpty), 1);
    assert!(empty_report.stages.is_empty());

    assert_eq!(unreachable_failure.kind, FailureKind::Connectivity);
    assert!(unreachable_failure.retryable);
    assert_eq!(
        diagnostics_with(&unreachable_report, DiagnosticCode::SourceUnreachable),
        1
    );

    assert_ne!(empty_failure.message, unreachable_failure.message);
}

#[tokio::test]
async fn rejected_preflight_query_is_a_permanent_stage_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let adapter = MockAdapterBuilder::new()
        .with_database("app")
        .with_stage_error(
            Level::Schema,
            FetchError::QueryError("syntax error at or near \"FROM\"".into()),
        )
        .build();
    let pipeline = pipeline(config(dir.path()), connector(adapter), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-bad-query", RunMetadata::default()).await;

    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Stage);
    assert_eq!(failure.level, Some(Level::Schema));
    assert!(!failure.retryable);
    assert!(failure.message.contains("syntax error"));
    assert_eq!(diagnostics_with(&report, DiagnosticCode::SourceQueryFailed), 1);
    assert_eq!(diagnostics_with(&report, DiagnosticCode::SourceUnreachable), 0);
}

#[tokio::test]
async fn malformed_exclude_pattern_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let source = connector(warehouse().build());
    let pipeline = pipeline(config(dir.path()), source.clone(), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-bad-regex", filters("", "temp_(")).await;

    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::FilterCompilation);
    assert_eq!(source.connect_count(), 0);
}

// =============================================================================
// Credentials and connection scope
// =============================================================================

#[tokio::test]
async fn nested_and_flat_credentials_run_identically() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let mut outcomes = Vec::new();
    for (workflow_id, credentials) in [
        ("wf-flat", flat_credentials()),
        ("wf-nested", nested_credentials()),
        ("wf-flat-bad", json!({"token": "ghp_wrong"})),
        ("wf-nested-bad", json!({"credentials": {"token": "ghp_wrong"}})),
    ] {
        let mut args = run_args(workflow_id, RunMetadata::default());
        args.credentials = credentials;
        store.put(&args).await.unwrap();

        let report = pipeline.run(workflow_id).await;
        outcomes.push((report.succeeded(), report.failure.map(|f| f.kind)));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0], (true, None));
    assert_eq!(outcomes[2], outcomes[3]);
    assert_eq!(outcomes[2], (false, Some(FailureKind::Authentication)));
}

#[tokio::test]
async fn connection_is_released_on_every_exit_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());

    let success = connector(warehouse().build());
    let stage_failure = connector(
        warehouse()
            .with_stage_error(Level::Table, FetchError::NetworkError("connection reset".into()))
            .build(),
    );
    let empty = connector(warehouse().build());

    for (workflow_id, source, metadata) in [
        ("wf-release-ok", success.clone(), RunMetadata::default()),
        ("wf-release-stage", stage_failure.clone(), RunMetadata::default()),
        ("wf-release-empty", empty.clone(), filters("nothing_here", "")),
    ] {
        let pipeline = pipeline(config(dir.path()), source.clone(), store.clone());
        stage_and_run(store.clone(), &pipeline, workflow_id, metadata).await;

        assert_eq!(source.connect_count(), 1, "{workflow_id}");
        assert_eq!(source.open_connections(), 0, "{workflow_id}");
    }
}

#[tokio::test]
async fn stage_failure_aborts_remaining_levels() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let adapter = warehouse()
        .with_stage_error(Level::Table, FetchError::NetworkError("connection reset".into()))
        .build();
    let pipeline = pipeline(config(dir.path()), connector(adapter), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-stage", RunMetadata::default()).await;

    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Stage);
    assert_eq!(failure.level, Some(Level::Table));
    assert!(failure.retryable);

    // Partial statistics for the failed level are kept; later levels never ran
    let tables = report.stage(Level::Table).unwrap();
    assert_eq!(tables.records_in, 6);
    assert!(report.stage(Level::Column).is_none());
    assert!(report.manifest_location.is_none());
}

#[tokio::test]
async fn missing_connection_identity_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let mut args = run_args("wf-defaults", RunMetadata::default());
    args.connection_name = None;
    args.connection_qualified_name = None;
    store.put(&args).await.unwrap();

    let report = pipeline.run("wf-defaults").await;
    assert!(report.succeeded());
    assert_eq!(diagnostics_with(&report, DiagnosticCode::Warning), 2);

    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    let database = entities.iter().find(|e| e.name == "app").unwrap();
    assert_eq!(database.qualified_name, "default/sourcesense/connection/app");
    assert_eq!(
        database.attribute("connectionName"),
        Some(&ScalarValue::from("sourcesense-default"))
    );
}

// =============================================================================
// Startup retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn run_succeeds_when_config_appears_on_third_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DelayedStore::available_on(3));
    store
        .put(&run_args("wf-late", RunMetadata::default()))
        .await
        .unwrap();
    let pipeline = pipeline(
        config(dir.path()),
        connector(warehouse().build()),
        store.clone(),
    );

    let started = Instant::now();
    let report = pipeline.run("wf-late").await;

    assert!(report.succeeded(), "{:?}", report.failure);
    assert_eq!(store.reads(), 3);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn run_fails_after_exactly_five_reads_two_seconds_apart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DelayedStore::never());
    let source = connector(warehouse().build());
    let pipeline = pipeline(config(dir.path()), source.clone(), store.clone());

    let (tx, mut rx) = watch::channel(RunPhase::Init);
    let started = Instant::now();
    let task = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run_observed("wf-never", tx).await })
    };

    // The wait is visible while it is in progress
    let waiting = rx
        .wait_for(|phase| matches!(phase, RunPhase::WaitingForConfig { .. }))
        .await
        .map(|phase| *phase)
        .unwrap();
    assert_eq!(
        waiting,
        RunPhase::WaitingForConfig {
            attempt: 1,
            max_attempts: 5
        }
    );

    let report = task.await.unwrap();

    assert_eq!(store.reads(), 5);
    assert!(started.elapsed() >= Duration::from_secs(8));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(*rx.borrow(), RunPhase::Failed);

    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Configuration);
    assert!(!failure.retryable);
    assert_eq!(diagnostics_with(&report, DiagnosticCode::ConfigUnavailable), 1);
    assert_eq!(source.connect_count(), 0);
}

// =============================================================================
// Sink
// =============================================================================

#[tokio::test]
async fn sink_failure_fails_run_without_reextracting() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let source = connector(warehouse().build());
    let sink = OutputSink::new(WriterStrategy::Parquet, Default::default())
        .with_primary_writer(Arc::new(BrokenWriter));
    let pipeline = Arc::new(
        sourcesense_engine::Pipeline::new(
            config(dir.path()),
            Arc::new(source.clone()),
            store.clone(),
        )
        .with_sink(sink),
    );

    let report = stage_and_run(store, &pipeline, "wf-sink", RunMetadata::default()).await;

    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::SinkWrite);
    assert!(!failure.retryable);
    assert_eq!(diagnostics_with(&report, DiagnosticCode::SinkWriteFailed), 1);
    assert_eq!(report.stages.len(), 4);

    // Schemas are read once for preflight and once for the stage
    let adapter = source.adapter();
    assert_eq!(adapter.extract_count(Level::Schema).await, 2);
    assert_eq!(adapter.extract_count(Level::Table).await, 1);
    assert_eq!(adapter.extract_count(Level::Column).await, 1);
    assert_eq!(source.connect_count(), 1);
    assert_eq!(source.open_connections(), 0);
}

#[cfg(not(windows))]
#[tokio::test]
async fn auto_writer_produces_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let mut config = config(dir.path());
    config.output.writer = WriterStrategy::Auto;
    let pipeline = pipeline(config, connector(warehouse().build()), store.clone());

    let report = stage_and_run(store, &pipeline, "wf-parquet", RunMetadata::default()).await;
    assert!(report.succeeded());

    let location = report.manifest_location.unwrap();
    let manifest = sourcesense_engine::Manifest::from_file(std::path::Path::new(&location)).unwrap();
    assert!(manifest
        .batches
        .iter()
        .all(|b| b.format == sourcesense_engine::BatchFormat::Parquet));
    assert_eq!(manifest.total_records, report.entity_count);
    assert!(location.contains("wf-parquet"));
}

// =============================================================================
// Run start
// =============================================================================

#[tokio::test]
async fn start_run_returns_before_the_run_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStateStore::new());
    let source = connector(
        MockAdapterBuilder::new()
            .with_levels(&[Level::Repository])
            .with_name("GitHub")
            .with_repository("octocat", "hello-world")
            .with_repository("octocat", "spoon-knife")
            .with_latency(50)
            .build(),
    );
    let service = SourceService::new(pipeline(config(dir.path()), source, store.clone()));

    let request = StartRunRequest {
        workflow_id: Some("wf-start".into()),
        credentials: nested_credentials(),
        connection_name: Some("github".into()),
        metadata: RunMetadata {
            owner: Some("octocat".into()),
            include_filter: Some("octocat/hello-.*".into()),
            ..RunMetadata::default()
        },
        output_prefix: None,
    };

    let handle = match service.start_run(request).await {
        RunAcceptance::Accepted(handle) => handle,
        RunAcceptance::Rejected { reason, .. } => panic!("run rejected: {reason}"),
    };
    assert!(!handle.phase().is_terminal());
    assert!(handle
        .connection()
        .qualified_name
        .starts_with("default/sourcesense/"));
    assert!(store.get("wf-start").await.is_ok());

    let report = handle.wait().await.unwrap();
    assert!(report.succeeded(), "{:?}", report.failure);

    let entities = read_entities(report.manifest_location.as_deref().unwrap());
    assert_eq!(
        names_of(&entities, EntityKind::Repository),
        BTreeSet::from(["hello-world".to_string()])
    );
    let repo = &entities[0];
    assert_eq!(repo.attribute("ownerLogin"), Some(&ScalarValue::from("octocat")));
    assert_eq!(repo.attribute("isFork"), Some(&ScalarValue::Bool(false)));
    assert_eq!(repo.attribute("status"), Some(&ScalarValue::from("ACTIVE")));
    assert_eq!(repo.attribute("lastSyncWorkflowName"), Some(&ScalarValue::from("wf-start")));
}
