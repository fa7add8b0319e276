//! Boundary operations: authentication check, preflight and run start
//!
//! These are what an HTTP layer or the CLI calls. None of them blocks for
//! the duration of a full run.

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, RunPhase};
use crate::state::{RunArgs, RunMetadata};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sourcesense_catalog::SourceScope;
use sourcesense_core::{Credentials, FailureKind, RunReport, SourceConnection};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

/// Result of a preflight check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightOutcome {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl PreflightOutcome {
    fn passed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            failure: None,
        }
    }

    fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            failure: Some(error.kind()),
        }
    }
}

/// Run-start request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartRunRequest {
    /// Generated when absent
    pub workflow_id: Option<String>,

    pub credentials: Value,
    pub connection_name: Option<String>,
    pub metadata: RunMetadata,
    pub output_prefix: Option<PathBuf>,
}

/// Outcome of a run-start request
#[derive(Debug)]
pub enum RunAcceptance {
    Accepted(RunHandle),
    Rejected { reason: String, kind: FailureKind },
}

impl RunAcceptance {
    fn rejected(error: &PipelineError) -> Self {
        Self::Rejected {
            reason: error.to_string(),
            kind: error.kind(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// A run executing in the background
#[derive(Debug)]
pub struct RunHandle {
    workflow_id: String,
    connection: SourceConnection,
    phase: watch::Receiver<RunPhase>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn connection(&self) -> &SourceConnection {
        &self.connection
    }

    /// Current phase of the run
    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Receiver for phase changes
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.clone()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunReport, JoinError> {
        self.task.await
    }
}

/// Entry points for one configured source
#[derive(Clone)]
pub struct SourceService {
    pipeline: Arc<Pipeline>,
}

impl SourceService {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Check that the credentials in `payload` are accepted by the source
    ///
    /// `payload` may carry the credentials flat or under `credentials`.
    pub async fn test_auth(&self, payload: &Value) -> Result<(), PipelineError> {
        let credentials = Credentials::from_payload(payload)?;
        let adapter = self
            .pipeline
            .connector()
            .connect(&credentials, &SourceScope::default())
            .await?;
        adapter.test_connection().await?;
        tracing::info!(source = adapter.name(), "authentication check passed");
        Ok(())
    }

    /// Check that the source is reachable and the filtered scope is non-empty
    ///
    /// Scope and filters are read from `payload["metadata"]`.
    pub async fn preflight_check(&self, payload: &Value) -> PreflightOutcome {
        match self.preflight(payload).await {
            Ok(message) => PreflightOutcome::passed(message),
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "preflight failed");
                PreflightOutcome::failed(&e)
            }
        }
    }

    async fn preflight(&self, payload: &Value) -> Result<String, PipelineError> {
        let credentials = Credentials::from_payload(payload)?;
        let metadata = match payload.get("metadata") {
            Some(metadata) => serde_json::from_value::<RunMetadata>(metadata.clone())
                .map_err(|e| PipelineError::Configuration(format!("invalid metadata: {}", e)))?,
            None => RunMetadata::default(),
        };
        let filter = metadata
            .filter_spec(&self.pipeline.config().filter)
            .compile()?;

        let adapter = self
            .pipeline
            .connector()
            .connect(&credentials, &metadata.scope())
            .await?;

        let level = adapter.preflight_level();
        let found = adapter
            .preflight(&filter)
            .await
            .map_err(|e| PipelineError::preflight(level, e))?;
        if !found {
            return Err(PipelineError::EmptyScope { level });
        }

        Ok(match &metadata.owner {
            Some(owner) => format!("Successfully connected and found owner '{}'.", owner),
            None => format!(
                "Successfully connected; matching {} records found.",
                level
            ),
        })
    }

    /// Stage the run's arguments and start it in the background
    ///
    /// Returns as soon as the run is spawned. Requests with unusable
    /// credentials or filters are rejected up front.
    pub async fn start_run(&self, request: StartRunRequest) -> RunAcceptance {
        let config = self.pipeline.config();

        if let Err(e) = Credentials::from_payload(&request.credentials) {
            return RunAcceptance::rejected(&e.into());
        }
        if let Err(e) = request.metadata.filter_spec(&config.filter).compile() {
            return RunAcceptance::rejected(&e.into());
        }

        let now = Utc::now();
        let workflow_id = request
            .workflow_id
            .unwrap_or_else(|| format!("{}-{}", config.app_name, now.timestamp_millis()));
        let connection = SourceConnection::new(
            request
                .connection_name
                .unwrap_or_else(|| config.default_connection_name()),
            SourceConnection::qualified_name_for(&config.tenant, &config.app_name, now.timestamp()),
        );

        let mut args = RunArgs::new(workflow_id.clone(), request.credentials)
            .with_connection(
                connection.connection_name.clone(),
                connection.qualified_name.clone(),
            )
            .with_metadata(request.metadata);
        args.output_prefix = request.output_prefix;

        if let Err(e) = self.pipeline.store().put(&args).await {
            return RunAcceptance::rejected(&e.into());
        }

        let (tx, rx) = watch::channel(RunPhase::Init);
        let pipeline = Arc::clone(&self.pipeline);
        let id = workflow_id.clone();
        let task = tokio::spawn(async move { pipeline.run_observed(&id, tx).await });

        tracing::info!(
            workflow_id = %workflow_id,
            connection = %connection.qualified_name,
            "run accepted"
        );

        RunAcceptance::Accepted(RunHandle {
            workflow_id,
            connection: connection.with_credential_ref(args.workflow_id),
            phase: rx,
            task,
        })
    }
}
