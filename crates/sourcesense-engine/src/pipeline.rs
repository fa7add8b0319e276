//! Pipeline controller
//!
//! One run moves through
//! `INIT -> PREFLIGHT -> EXTRACT(level)... -> FINALIZE -> SUCCEEDED | FAILED`.
//! Levels are extracted parent-first; a level's entities are indexed only
//! after the whole level has been read, so child lookups always see a
//! complete parent level.

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::sink::OutputSink;
use crate::state::{RunArgs, StateError, StateStore};
use crate::transformer::{DropReason, EntityIndex, RecordTransformer};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sourcesense_catalog::{SourceAdapter, SourceConnector};
use sourcesense_core::{
    CompiledFilter, Config, Credentials, Diagnostic, DiagnosticCode, Level, ReportVersion,
    RunFailure, RunReport, RunStatus, Severity, SourceConnection, StageResult,
};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

/// Externally visible phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,

    /// Staged arguments not found yet; waiting before the next read
    WaitingForConfig { attempt: u32, max_attempts: u32 },

    Preflight,
    Extracting(Level),
    Finalizing,
    Succeeded,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::WaitingForConfig {
                attempt,
                max_attempts,
            } => write!(f, "INIT (waiting for config, attempt {}/{})", attempt, max_attempts),
            Self::Preflight => write!(f, "PREFLIGHT"),
            Self::Extracting(level) => write!(f, "EXTRACT({})", level),
            Self::Finalizing => write!(f, "FINALIZE"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// State of one run
///
/// Created at run start and never reused. Once terminal, every mutation is
/// refused.
#[derive(Debug)]
pub struct PipelineRun {
    workflow_id: String,
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    phase: RunPhase,
    stages: Vec<StageResult>,
    diagnostics: Vec<Diagnostic>,
    failure: Option<RunFailure>,
    entity_count: u64,
    manifest_location: Option<String>,
    phase_tx: watch::Sender<RunPhase>,
}

impl PipelineRun {
    pub fn new(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        phase_tx: watch::Sender<RunPhase>,
    ) -> Self {
        phase_tx.send_replace(RunPhase::Init);
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            phase: RunPhase::Init,
            stages: Vec::new(),
            diagnostics: Vec::new(),
            failure: None,
            entity_count: 0,
            manifest_location: None,
            phase_tx,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    /// Move to `phase`; returns `false` if the run is already terminal
    pub fn transition(&mut self, phase: RunPhase) -> bool {
        if self.phase.is_terminal() {
            tracing::warn!(
                current = %self.phase,
                requested = %phase,
                "ignoring transition of a finished run"
            );
            return false;
        }
        tracing::debug!(from = %self.phase, to = %phase, "run phase");
        self.phase = phase;
        self.phase_tx.send_replace(phase);
        true
    }

    pub fn push_stage(&mut self, stage: StageResult) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.stages.push(stage);
        true
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.diagnostics.push(diagnostic);
        true
    }

    /// Record the failure and move to FAILED
    pub fn fail(&mut self, error: &PipelineError) -> bool {
        if self.phase.is_terminal() {
            return false;
        }

        let mut diagnostic =
            Diagnostic::new(error.diagnostic_code(), Severity::Error, error.to_string());
        if let Some(level) = error.level() {
            diagnostic = diagnostic.at_level(level);
        }
        self.diagnostics.push(diagnostic);

        self.failure = Some(RunFailure {
            kind: error.kind(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            level: error.level(),
        });
        self.finished_at = Some(Utc::now());
        self.transition(RunPhase::Failed)
    }

    /// Record the sink hand-off and move to SUCCEEDED
    pub fn succeed(&mut self, entity_count: u64, manifest_location: String) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.entity_count = entity_count;
        self.manifest_location = Some(manifest_location);
        self.finished_at = Some(Utc::now());
        self.transition(RunPhase::Succeeded)
    }

    /// Snapshot of the run as a report
    pub fn report(&self) -> RunReport {
        let status = match self.phase {
            RunPhase::Succeeded => RunStatus::Succeeded,
            _ => RunStatus::Failed,
        };
        RunReport {
            version: ReportVersion::CURRENT,
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            started_at: self.started_at.to_rfc3339(),
            finished_at: self.finished_at.unwrap_or_else(Utc::now).to_rfc3339(),
            status,
            failure: self.failure.clone(),
            stages: self.stages.clone(),
            entity_count: self.entity_count,
            manifest_location: self.manifest_location.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

/// Runs the extract-filter-transform pipeline
pub struct Pipeline {
    config: Config,
    connector: Arc<dyn SourceConnector>,
    store: Arc<dyn StateStore>,
    sink: OutputSink,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        config: Config,
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let sink = OutputSink::from_config(&config.output);
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            connector,
            store,
            sink,
            retry,
        }
    }

    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn SourceConnector> {
        &self.connector
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Run the workflow whose arguments were staged under `workflow_id`
    pub async fn run(&self, workflow_id: &str) -> RunReport {
        let (tx, _rx) = watch::channel(RunPhase::Init);
        self.run_observed(workflow_id, tx).await
    }

    /// Like [`Pipeline::run`], publishing every phase change on `phase`
    pub async fn run_observed(&self, workflow_id: &str, phase: watch::Sender<RunPhase>) -> RunReport {
        let mut run = PipelineRun::new(workflow_id, new_run_id(), phase);
        let span = tracing::info_span!("pipeline_run", workflow_id, run_id = %run.run_id());

        async {
            tracing::info!("run started");
            let result = match self.load_args(&mut run).await {
                Ok(args) => self.execute(&mut run, args).await,
                Err(e) => Err(e),
            };
            self.finish(&mut run, result);
        }
        .instrument(span)
        .await;

        run.report()
    }

    /// Run with arguments supplied directly instead of staged
    pub async fn run_with_args(&self, args: RunArgs) -> RunReport {
        let (tx, _rx) = watch::channel(RunPhase::Init);
        let mut run = PipelineRun::new(args.workflow_id.clone(), new_run_id(), tx);
        let span = tracing::info_span!("pipeline_run", workflow_id = %args.workflow_id, run_id = %run.run_id());

        async {
            tracing::info!("run started");
            let result = self.execute(&mut run, args).await;
            self.finish(&mut run, result);
        }
        .instrument(span)
        .await;

        run.report()
    }

    fn finish(&self, run: &mut PipelineRun, result: Result<(u64, String), PipelineError>) {
        match result {
            Ok((entity_count, location)) => {
                tracing::info!(entities = entity_count, manifest = %location, "run succeeded");
                run.succeed(entity_count, location);
            }
            Err(e) => {
                tracing::error!(kind = %e.kind(), retryable = e.is_retryable(), error = %e, "run failed");
                run.fail(&e);
            }
        }
    }

    /// Read staged arguments, polling while they are not there yet
    async fn load_args(&self, run: &mut PipelineRun) -> Result<RunArgs, PipelineError> {
        let store = &self.store;
        let workflow_id = run.workflow_id().to_string();
        let max_attempts = self.retry.max_attempts.max(1);

        let result = self
            .retry
            .run(
                |attempt| {
                    tracing::debug!(attempt, "reading staged run arguments");
                    store.get(&workflow_id)
                },
                StateError::is_not_found,
                |attempt, delay| {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "run arguments not staged yet, waiting"
                    );
                    run.transition(RunPhase::WaitingForConfig {
                        attempt,
                        max_attempts,
                    });
                },
            )
            .await;

        match result {
            Ok(args) => {
                run.transition(RunPhase::Init);
                Ok(args)
            }
            Err(e) if e.is_not_found() => Err(PipelineError::ConfigUnavailable {
                workflow_id,
                attempts: max_attempts,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// INIT through FINALIZE; returns the entity count and manifest location
    async fn execute(
        &self,
        run: &mut PipelineRun,
        args: RunArgs,
    ) -> Result<(u64, String), PipelineError> {
        let credentials = Credentials::from_payload(&args.credentials)?;
        let connection = self.resolve_connection(run, &args);
        let filter = args.metadata.filter_spec(&self.config.filter).compile()?;
        let output_dir = self
            .output_root(&args)
            .join(run.workflow_id())
            .join(run.run_id());

        run.transition(RunPhase::Preflight);
        let adapter = self
            .connector
            .connect(&credentials, &args.metadata.scope())
            .await?;
        tracing::info!(source = adapter.name(), "source connected");

        let levels = ordered_levels(adapter.levels())?;

        let preflight_level = adapter.preflight_level();
        let found = adapter
            .preflight(&filter)
            .await
            .map_err(|e| PipelineError::preflight(preflight_level, e))?;
        if !found {
            return Err(PipelineError::EmptyScope {
                level: preflight_level,
            });
        }
        tracing::info!(level = %preflight_level, "preflight found matching records");

        let transformer = RecordTransformer::new(connection, self.config.transform.encoding)
            .with_run(run.workflow_id(), run.run_id());
        let mut index = EntityIndex::new();

        for level in levels {
            run.transition(RunPhase::Extracting(level));
            self.extract_stage(adapter.as_ref(), level, &filter, &transformer, &mut index, run)
                .await?;
        }

        drop(adapter);
        tracing::debug!("source connection released");

        run.transition(RunPhase::Finalizing);
        let entities = index.finalize();

        let output = self
            .sink
            .emit(entities, &output_dir, run.workflow_id(), run.run_id())
            .await?;
        for diagnostic in output.diagnostics {
            run.push_diagnostic(diagnostic);
        }

        Ok((output.manifest.total_records, output.location))
    }

    /// One level's extract-filter-transform pass
    ///
    /// The stage result is recorded even when the stage fails.
    async fn extract_stage(
        &self,
        adapter: &dyn SourceAdapter,
        level: Level,
        filter: &CompiledFilter,
        transformer: &RecordTransformer,
        index: &mut EntityIndex,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        let started = Instant::now();
        let mut stage = StageResult::new(level);
        let mut produced = Vec::new();
        let mut names = HashSet::new();
        let mut diagnostics = Vec::new();

        let mut records = adapter.extract(level, filter);
        let failure = loop {
            let Some(item) = records.next().await else {
                break None;
            };

            let record = match item {
                Ok(record) => record,
                Err(e) if e.is_record_level() => {
                    stage.records_in += 1;
                    stage.errored += 1;
                    tracing::debug!(level = %level, error = %e, "skipping undecodable record");
                    stage.record_error(e.to_string());
                    push_capped(
                        &mut diagnostics,
                        Diagnostic::new(DiagnosticCode::RecordInvalid, Severity::Warn, e.to_string())
                            .at_level(level),
                    );
                    continue;
                }
                Err(e) => break Some(PipelineError::stage(level, e)),
            };
            stage.records_in += 1;

            let decision = filter.evaluate(&record);
            if !decision.is_admitted() {
                stage.filtered += 1;
                tracing::trace!(level = %level, key = ?record.filter_key(), ?decision, "filtered");
                continue;
            }

            let outcome = transformer.transform(&record, index).and_then(|t| {
                let qualified_name = &t.entity.qualified_name;
                if index.contains(qualified_name) || !names.insert(qualified_name.clone()) {
                    return Err(DropReason::Duplicate {
                        entity: qualified_name.clone(),
                    });
                }
                Ok(t)
            });

            match outcome {
                Ok(transformed) => {
                    stage.sanitized_fields += transformed.sanitized_fields;
                    produced.push(transformed.entity);
                }
                Err(reason) => {
                    if reason.is_orphan() {
                        stage.orphaned += 1;
                    } else {
                        stage.errored += 1;
                    }
                    tracing::debug!(level = %level, reason = %reason, "dropped record");
                    stage.record_error(reason.to_string());
                    push_capped(&mut diagnostics, reason.diagnostic(level));
                }
            }
        };
        drop(records);

        stage.records_out = produced.len() as u64;
        stage.duration_ms = started.elapsed().as_millis() as u64;

        if stage.sanitized_fields > 0 {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::RecordSanitized,
                    Severity::Info,
                    format!("{} text fields had characters replaced", stage.sanitized_fields),
                )
                .at_level(level),
            );
        }

        tracing::info!(
            level = %level,
            records_in = stage.records_in,
            records_out = stage.records_out,
            filtered = stage.filtered,
            orphaned = stage.orphaned,
            errored = stage.errored,
            duration_ms = stage.duration_ms,
            "stage finished"
        );

        for diagnostic in diagnostics {
            run.push_diagnostic(diagnostic);
        }
        run.push_stage(stage);

        if let Some(e) = failure {
            return Err(e);
        }

        for entity in produced {
            index.insert(level, entity);
        }
        index.mark_level(level);
        Ok(())
    }

    fn resolve_connection(&self, run: &mut PipelineRun, args: &RunArgs) -> SourceConnection {
        let name = args.connection_name.clone().unwrap_or_else(|| {
            let name = self.config.default_connection_name();
            tracing::warn!(connection_name = %name, "connection name not supplied, using default");
            run.push_diagnostic(
                Diagnostic::new(
                    DiagnosticCode::Warning,
                    Severity::Warn,
                    format!("Connection name not supplied; using '{}'", name),
                )
                .with_field("connection_name"),
            );
            name
        });

        let qualified_name = args.connection_qualified_name.clone().unwrap_or_else(|| {
            let qualified_name = self.config.default_connection_qualified_name();
            tracing::warn!(
                connection_qualified_name = %qualified_name,
                "connection qualified name not supplied, using default"
            );
            run.push_diagnostic(
                Diagnostic::new(
                    DiagnosticCode::Warning,
                    Severity::Warn,
                    format!(
                        "Connection qualified name not supplied; using '{}'",
                        qualified_name
                    ),
                )
                .with_field("connection_qualified_name"),
            );
            qualified_name
        });

        SourceConnection::new(name, qualified_name).with_credential_ref(run.workflow_id())
    }

    fn output_root(&self, args: &RunArgs) -> PathBuf {
        match &args.output_prefix {
            Some(prefix) => self.config.resolve_path(prefix),
            None => self.config.resolve_path(&self.config.output.dir),
        }
    }
}

/// Run ids are the start time in milliseconds
fn new_run_id() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Keep per-stage diagnostics to the same cap as stage error messages
fn push_capped(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    if diagnostics.len() < StageResult::MAX_ERRORS {
        diagnostics.push(diagnostic);
    }
}

/// Levels in parent-before-child order
///
/// Every non-root level needs its parent level in the same run, or none of
/// its records could resolve a parent.
fn ordered_levels(levels: &[Level]) -> Result<Vec<Level>, PipelineError> {
    for level in levels {
        if let Some(parent) = level.parent() {
            if !levels.contains(&parent) {
                return Err(PipelineError::Configuration(format!(
                    "source provides {} records without their parent level {}",
                    level, parent
                )));
            }
        }
    }

    let mut ordered = levels.to_vec();
    ordered.sort_by_key(|level| level.depth());
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> (PipelineRun, watch::Receiver<RunPhase>) {
        let (tx, rx) = watch::channel(RunPhase::Init);
        (PipelineRun::new("wf-1", "1", tx), rx)
    }

    #[test]
    fn terminal_runs_are_immutable() {
        let (mut run, rx) = new_run();
        assert!(run.transition(RunPhase::Preflight));
        assert!(run.succeed(3, "out/manifest.json".into()));

        let before = run.report();
        assert!(!run.fail(&PipelineError::Connectivity("late".into())));
        assert!(!run.transition(RunPhase::Extracting(Level::Table)));
        assert!(!run.push_stage(StageResult::new(Level::Table)));
        assert!(!run.push_diagnostic(Diagnostic::new(
            DiagnosticCode::Info,
            Severity::Info,
            "late"
        )));

        let after = run.report();
        assert_eq!(after.status, RunStatus::Succeeded);
        assert_eq!(after.failure, None);
        assert_eq!(after.stages, before.stages);
        assert_eq!(after.finished_at, before.finished_at);
        assert_eq!(*rx.borrow(), RunPhase::Succeeded);
    }

    #[test]
    fn failure_is_reported_with_kind() {
        let (mut run, rx) = new_run();
        run.fail(&PipelineError::EmptyScope {
            level: Level::Schema,
        });

        let report = run.report();
        assert!(!report.succeeded());
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, sourcesense_core::FailureKind::EmptyScope);
        assert!(!failure.retryable);
        assert_eq!(failure.level, Some(Level::Schema));
        assert_eq!(report.diagnostics[0].code, DiagnosticCode::PreflightEmpty);
        assert_eq!(*rx.borrow(), RunPhase::Failed);
    }

    #[test]
    fn levels_are_ordered_parent_first() {
        let levels = ordered_levels(&[Level::Column, Level::Database, Level::Table, Level::Schema])
            .unwrap();
        assert_eq!(
            levels,
            vec![Level::Database, Level::Schema, Level::Table, Level::Column]
        );
    }

    #[test]
    fn levels_without_parent_level_are_rejected() {
        let err = ordered_levels(&[Level::Schema, Level::Table]).unwrap_err();
        assert_eq!(err.kind(), sourcesense_core::FailureKind::Configuration);
    }

    #[test]
    fn phase_display() {
        assert_eq!(RunPhase::Extracting(Level::Table).to_string(), "EXTRACT(table)");
        assert_eq!(
            RunPhase::WaitingForConfig {
                attempt: 2,
                max_attempts: 5
            }
            .to_string(),
            "INIT (waiting for config, attempt 2/5)"
        );
    }
}
