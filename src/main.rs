#![forbid(unsafe_code)]

//! `caf-runtime`: run agent tasks and inspect their checkpoints.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use caf_runtime::config::AgentConfig;
use caf_runtime::orchestrator::checkpoint_manager::RelationalWrite;
use caf_runtime::{AppError, Engine, Result, RunOptions, RunStatus};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "caf-runtime", about = "Resumable agent execution runtime", version, long_about = None)]
struct Cli {
    /// Path to the agent TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a task, optionally resuming from a checkpoint.
    Run {
        /// Task text.
        task: String,
        /// Checkpoint id to resume from.
        #[arg(long)]
        resume_from: Option<String>,
    },
    /// Print a stored checkpoint as JSON.
    Export {
        /// Checkpoint id.
        id: String,
    },
    /// Fork a stored checkpoint into a new branch checkpoint.
    Branch {
        /// Checkpoint id.
        id: String,
        /// Why the branch is taken.
        #[arg(long, default_value = "manual branch")]
        reason: String,
    },
    /// List checkpoint ids in the export directory.
    List,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = AgentConfig::load_from_path(&args.config)?;
    info!(agent_id = config.agent_id(), "configuration loaded");
    let engine = Engine::open(config).await?;

    let output = match args.command {
        Command::Run { task, resume_from } => {
            let options = RunOptions {
                resume_from,
                ..RunOptions::default()
            };
            let outcome = engine.run(&task, options).await?;
            let status = match &outcome.status {
                RunStatus::Completed(result) => json!({ "status": "completed", "result": result }),
                RunStatus::Exhausted => json!({ "status": "exhausted" }),
                RunStatus::Halted {
                    pause_point_id,
                    action,
                } => json!({
                    "status": "halted",
                    "pause_point_id": pause_point_id,
                    "action": action,
                }),
            };
            json!({
                "execution_id": outcome.execution_id,
                "outcome": status,
                "progress": outcome.state.progress,
                "checkpoint_id": outcome.checkpoint.as_ref().map(|c| c.id.clone()),
            })
        }
        Command::Export { id } => serde_json::to_value(engine.export_checkpoint(&id).await?)?,
        Command::Branch { id, reason } => {
            let manager = engine
                .checkpoints()
                .ok_or_else(|| AppError::Config("checkpointing is disabled for this agent".into()))?;
            let outcome = manager.branch(&id, &reason).await?;
            let relational = match outcome.relational {
                RelationalWrite::Skipped => json!("skipped"),
                RelationalWrite::Written => json!("written"),
                RelationalWrite::Failed(err) => json!({ "failed": err }),
            };
            json!({
                "checkpoint_id": outcome.checkpoint.id,
                "parent": outcome.checkpoint.parent,
                "relational": relational,
            })
        }
        Command::List => {
            let manager = engine
                .checkpoints()
                .ok_or_else(|| AppError::Config("checkpointing is disabled for this agent".into()))?;
            json!(manager.files().list_ids().await?)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
