//! # Notiflow: step execution CLI
//!
//! Dispatches queued workflow jobs to their bridge and inspects the state and
//! audit trail of individual jobs.
//!
//! Usage:
//!   notiflow init                                   # Write ~/.notiflow/config.toml
//!   notiflow execute --environment env --job job    # Dispatch one job
//!   notiflow state --environment env --job job      # Print the replay state
//!   notiflow details --environment env --job job    # Print execution details
//!   notiflow worker                                 # Drain queued jobs forever

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use notiflow_core::NotiflowConfig;
use notiflow_core::traits::{ExecutionDetailSink, JobStore};
use notiflow_core::types::Job;
use notiflow_executor::{BridgeDispatcher, DashboardSanitizer, HttpBridgeExecutor, Worker};
use notiflow_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "notiflow",
    version,
    about = "📨 Notiflow: workflow step execution core"
)]
struct Cli {
    /// Config file (defaults to ~/.notiflow/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Dispatch one job and print the executor output
    Execute {
        #[arg(long)]
        environment: String,
        #[arg(long)]
        job: String,
    },
    /// Print the execution state a job would be dispatched with
    State {
        #[arg(long)]
        environment: String,
        #[arg(long)]
        job: String,
    },
    /// Print the execution details recorded for a job
    Details {
        #[arg(long)]
        environment: String,
        #[arg(long)]
        job: String,
    },
    /// Poll for queued jobs and dispatch them
    Worker,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "notiflow=debug,notiflow_executor=debug,notiflow_store=debug,notiflow_core=debug"
    } else {
        "notiflow=info,notiflow_executor=info,notiflow_store=info,notiflow_core=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&str>) -> Result<NotiflowConfig> {
    let config = match path {
        Some(p) => NotiflowConfig::load_from(&expand_path(p))?,
        None => NotiflowConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &NotiflowConfig) -> Result<Arc<SqliteStore>> {
    let db_path = expand_path(&config.database_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    Ok(Arc::new(store))
}

fn build_dispatcher(store: &Arc<SqliteStore>, config: &NotiflowConfig) -> BridgeDispatcher {
    let executor = Arc::new(HttpBridgeExecutor::new(config.bridge.clone()));
    BridgeDispatcher::from_store(
        store.clone(),
        executor,
        Arc::new(DashboardSanitizer::new()),
        config.chain.max_depth,
    )
}

async fn find_job(store: &SqliteStore, environment: &str, job_id: &str) -> Result<Job> {
    store
        .find_job(environment, job_id)
        .await?
        .with_context(|| format!("job {job_id} not found in environment {environment}"))
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("⚠️  Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    NotiflowConfig::default().save_to(path)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    if let Command::Init { force } = &cli.command {
        let path = cli
            .config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(NotiflowConfig::default_path);
        return init_config(&path, *force);
    }

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(&config)?;

    match cli.command {
        Command::Init { .. } => {}
        Command::Execute { environment, job } => {
            let job = find_job(&store, &environment, &job).await?;
            let dispatcher = build_dispatcher(&store, &config);
            match dispatcher.execute(&job).await? {
                Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                None => println!("⏭️  Workflow {} no longer exists, nothing to execute", job.workflow_id),
            }
        }
        Command::State { environment, job } => {
            let job = find_job(&store, &environment, &job).await?;
            let state = build_dispatcher(&store, &config).preview_state(&job).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Details { environment, job } => {
            let details = store.list_for_job(&environment, &job).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Command::Worker => {
            let dispatcher = Arc::new(build_dispatcher(&store, &config));
            let worker = Arc::new(Worker::new(store.clone(), dispatcher, config.worker.clone()));
            notiflow_executor::spawn_worker(worker).await;
        }
    }

    Ok(())
}
