use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sourcesense_catalog::{
    GitHubConnector, MockAdapterBuilder, MockConnector, PostgresConnector, SourceConnector,
    DEFAULT_BASE_URL,
};
use sourcesense_core::{Config, Level, RunReport, Severity};
use sourcesense_engine::{
    FileStateStore, Pipeline, RunAcceptance, RunMetadata, SourceService, StartRunRequest,
};

/// SourceSense - metadata extraction for databases and code hosts
#[derive(Parser)]
#[command(name = "sourcesense")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sourcesense.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the credentials are accepted by the source
    Auth {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Check that the source is reachable and the filters match something
    Preflight {
        #[command(flatten)]
        credentials: CredentialArgs,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Execute a run whose arguments are already staged
    Run {
        /// Workflow id the arguments were staged under
        #[arg(short, long)]
        workflow_id: String,

        /// Also write the run report to this file
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Stage a new run and start it
    Start {
        #[command(flatten)]
        credentials: CredentialArgs,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Workflow id (generated when absent)
        #[arg(short, long)]
        workflow_id: Option<String>,

        /// Connection name recorded on every entity
        #[arg(long)]
        connection_name: Option<String>,

        /// Output directory overriding the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print phase changes while the run executes
        #[arg(long)]
        progress: bool,
    },
}

#[derive(Args)]
struct CredentialArgs {
    /// JSON credentials payload, flat or nested under "credentials"
    #[arg(long, conflicts_with = "token")]
    credentials_file: Option<PathBuf>,

    /// API token (defaults to $SOURCESENSE_TOKEN, then $GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Database user; the password is read from $SOURCESENSE_PASSWORD
    #[arg(long)]
    username: Option<String>,
}

#[derive(Args)]
struct ScopeArgs {
    /// Repository owner to scan
    #[arg(long)]
    owner: Option<String>,

    /// Database to scan
    #[arg(long)]
    catalog: Option<String>,

    /// Include pattern
    #[arg(long)]
    include: Option<String>,

    /// Exclude pattern
    #[arg(long)]
    exclude: Option<String>,

    /// Temporary-table pattern
    #[arg(long)]
    temp_table: Option<String>,
}

impl ScopeArgs {
    fn metadata(self) -> RunMetadata {
        RunMetadata {
            owner: self.owner,
            catalog: self.catalog,
            include_filter: self.include,
            exclude_filter: self.exclude,
            temp_table_regex: self.temp_table,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("sourcesense.toml").exists() {
        Config::from_file(Path::new("sourcesense.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if cli.verbose {
        eprintln!("{} source: {}", "Using".cyan(), config.source.source_type);
    }

    let service = build_service(config)?;

    match cli.command {
        Commands::Auth { credentials } => auth_command(&service, credentials).await,
        Commands::Preflight { credentials, scope } => {
            preflight_command(&service, credentials, scope).await
        }
        Commands::Run {
            workflow_id,
            report,
        } => run_command(&service, &workflow_id, report.as_deref()).await,
        Commands::Start {
            credentials,
            scope,
            workflow_id,
            connection_name,
            output,
            progress,
        } => {
            let request = StartRunRequest {
                workflow_id,
                credentials: credentials_payload(credentials)?,
                connection_name,
                metadata: scope.metadata(),
                output_prefix: output,
            };
            start_command(&service, request, progress).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

/// Wire the configured source, state directory and output into a service
fn build_service(config: Config) -> Result<SourceService> {
    let connector = build_connector(&config)?;
    let state_dir = config.resolve_path(&config.state.dir);
    let store = Arc::new(FileStateStore::new(state_dir));
    let pipeline = Pipeline::new(config, connector, store);
    Ok(SourceService::new(Arc::new(pipeline)))
}

fn build_connector(config: &Config) -> Result<Arc<dyn SourceConnector>> {
    let source = &config.source;
    let connector: Arc<dyn SourceConnector> = match source.source_type.as_str() {
        "github" => {
            let base_url = source.setting("base_url").unwrap_or(DEFAULT_BASE_URL);
            Arc::new(GitHubConnector::new(base_url))
        }
        "postgres" => {
            let host = source.setting("host").unwrap_or("localhost");
            let port = match source.setting("port") {
                Some(port) => port
                    .parse::<u16>()
                    .with_context(|| format!("Invalid port '{}' in [source]", port))?,
                None => 5432,
            };
            let mut connector = PostgresConnector::new(host, port)
                .with_tls(source.setting("tls").is_some_and(|tls| tls == "true"));
            if let Some(database) = source.setting("database") {
                connector = connector.with_database(database);
            }
            if let Some(user) = source.setting("user") {
                connector = connector.with_user(user);
            }
            Arc::new(connector)
        }
        "mock" => Arc::new(MockConnector::new(demo_dataset())),
        other => {
            return Err(anyhow::anyhow!(
                "Unsupported source type '{}'. Supported: github, postgres, mock",
                other
            ));
        }
    };
    Ok(connector)
}

/// Small warehouse served by the `mock` source type
fn demo_dataset() -> sourcesense_catalog::MockAdapter {
    MockAdapterBuilder::new()
        .with_name("Demo")
        .with_database("shop")
        .with_schema("shop", "sales")
        .with_schema("shop", "staging")
        .with_table("shop", "sales", "orders")
        .with_table("shop", "sales", "customers")
        .with_table("shop", "staging", "orders_raw")
        .with_column("shop", "sales", "orders", "id")
        .with_column("shop", "sales", "orders", "customer_id")
        .with_column("shop", "sales", "orders", "total")
        .with_column("shop", "sales", "customers", "id")
        .with_column("shop", "sales", "customers", "email")
        .with_column("shop", "staging", "orders_raw", "payload")
        .build()
}

/// Assemble the credentials payload from a file, flags or the environment
fn credentials_payload(args: CredentialArgs) -> Result<Value> {
    if let Some(path) = args.credentials_file {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credentials from {}", path.display()))?;
        return serde_json::from_str(&contents)
            .with_context(|| format!("Credentials file {} is not valid JSON", path.display()));
    }

    let token = args
        .token
        .or_else(|| std::env::var("SOURCESENSE_TOKEN").ok())
        .or_else(|| std::env::var("GITHUB_TOKEN").ok());
    let password = std::env::var("SOURCESENSE_PASSWORD").ok();

    let mut payload = serde_json::Map::new();
    if let Some(token) = token {
        payload.insert("token".to_string(), json!(token));
    }
    if let Some(username) = args.username {
        payload.insert("username".to_string(), json!(username));
    }
    if let Some(password) = password {
        payload.insert("password".to_string(), json!(password));
    }
    Ok(Value::Object(payload))
}

async fn auth_command(service: &SourceService, credentials: CredentialArgs) -> Result<()> {
    let payload = credentials_payload(credentials)?;

    match service.test_auth(&payload).await {
        Ok(()) => {
            println!("{}", "✓ Authentication successful".green().bold());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Authentication failed:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn preflight_command(
    service: &SourceService,
    credentials: CredentialArgs,
    scope: ScopeArgs,
) -> Result<()> {
    let mut payload = credentials_payload(credentials)?;
    if let Value::Object(map) = &mut payload {
        map.insert("metadata".to_string(), serde_json::to_value(scope.metadata())?);
    }

    let outcome = service.preflight_check(&payload).await;
    if outcome.success {
        println!("{} {}", "✓".green().bold(), outcome.message);
        Ok(())
    } else {
        let kind = outcome
            .failure
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!(
            "{} {} ({})",
            "✗ Preflight failed:".red().bold(),
            outcome.message,
            kind
        );
        std::process::exit(1);
    }
}

async fn run_command(
    service: &SourceService,
    workflow_id: &str,
    report_path: Option<&Path>,
) -> Result<()> {
    eprintln!("{} {}", "Running workflow".cyan(), workflow_id);

    let report = service.pipeline().run(workflow_id).await;
    finish(&report, report_path)
}

async fn start_command(
    service: &SourceService,
    request: StartRunRequest,
    progress: bool,
) -> Result<()> {
    let handle = match service.start_run(request).await {
        RunAcceptance::Accepted(handle) => handle,
        RunAcceptance::Rejected { reason, kind } => {
            eprintln!("{} {} ({})", "✗ Run rejected:".red().bold(), reason, kind);
            std::process::exit(1);
        }
    };

    println!(
        "{} workflow {} on {}",
        "✓ Run started:".green().bold(),
        handle.workflow_id(),
        handle.connection().qualified_name
    );

    let watcher = progress.then(|| {
        let mut phases = handle.subscribe();
        tokio::spawn(async move {
            while phases.changed().await.is_ok() {
                let phase = *phases.borrow_and_update();
                eprintln!("  {} {}", "→".cyan(), phase);
                if phase.is_terminal() {
                    break;
                }
            }
        })
    });

    // The run executes on this process's runtime, so the command always
    // waits for it
    let report = handle.wait().await?;
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    finish(&report, None)
}

fn finish(report: &RunReport, report_path: Option<&Path>) -> Result<()> {
    if let Some(path) = report_path {
        report.save_to_file(path)?;
        eprintln!("{} {}", "Run report saved to:".green(), path.display());
    }

    print_summary(report);

    if !report.succeeded() {
        std::process::exit(if report.is_retryable() { 75 } else { 1 });
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "SourceSense Run Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Workflow: {}", report.workflow_id);
    println!("Run:      {}", report.run_id);
    println!();

    println!("{}", "Stages:".bold());
    for stage in &report.stages {
        println!(
            "  {:<11} in {:>6}  out {:>6}  filtered {:>5}  orphaned {:>4}  errored {:>4}",
            level_label(stage.level),
            stage.records_in,
            format!("{}", stage.records_out).green(),
            stage.filtered,
            stage.orphaned,
            stage.errored,
        );
    }
    println!();

    if !report.diagnostics.is_empty() {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };
            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);
        }
        println!();
    }

    match &report.failure {
        None => {
            println!(
                "{} {} entities written",
                "✓".green().bold(),
                report.entity_count
            );
            if let Some(location) = &report.manifest_location {
                println!("  Manifest: {}", location);
            }
        }
        Some(failure) => {
            println!(
                "{} {}: {}",
                "✗ Run failed".red().bold(),
                failure.kind,
                failure.message
            );
            if failure.retryable {
                println!("  {}", "This failure is transient; the run may be retried.".yellow());
            }
        }
    }
}

fn level_label(level: Level) -> String {
    let name = level.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
