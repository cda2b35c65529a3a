// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `ev`: run and manage model evaluation jobs across backends.

mod color;
mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ev_backends::{
    CloudExecutor, LocalExecutor, OpenSshLauncher, RegistryCredentials, SlurmExecutor,
    SshConnectionPool,
};
use ev_engine::{ExecutorRegistry, Orchestrator, ShellCommandRenderer};
use ev_store::ExecutionDb;
use exit_error::ExitError;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "ev",
    version,
    about = "Run and manage model evaluation jobs",
    styles = color::styles()
)]
struct Cli {
    /// Execution record store root (default: ~/.ev/db)
    #[arg(long, global = true, env = "EV_DB")]
    db: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long = "output", global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch an evaluation from a resolved run configuration
    Run {
        /// Path to the run configuration (JSON)
        config: PathBuf,

        /// Write submission artifacts without launching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the status of jobs or invocations
    Status {
        /// Job or invocation IDs (unique prefixes accepted)
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Kill a job, or every job of an invocation
    Kill {
        /// Job or invocation ID (unique prefix accepted)
        id: String,
    },
    /// Stream logs for a job or invocation until interrupted
    Logs {
        /// Job or invocation ID (unique prefix accepted)
        id: String,
    },
    /// Pull result artifacts for a job or invocation
    Fetch {
        /// Job or invocation ID (unique prefix accepted)
        id: String,
    },
    /// Re-run an invocation from its stored configuration
    Resume {
        /// Job or invocation ID (unique prefix accepted)
        id: String,
    },
    /// List the tasks a harness image exposes, without pulling it
    Tasks {
        /// Image reference, e.g. registry.example.com/eval/lmeval:1.2
        image: String,

        /// Skip layers larger than this many bytes when searching
        #[arg(long)]
        max_layer_size: Option<u64>,

        /// Username for the registry token endpoint (private registries)
        #[arg(long, env = "EV_REGISTRY_USER")]
        registry_user: Option<String>,

        /// Password for the registry token endpoint
        #[arg(long, env = "EV_REGISTRY_PASSWORD", hide_env_values = true)]
        registry_password: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli).await {
        eprintln!("error: {}", err.message);
        std::process::exit(err.code);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), ExitError> {
    let format = cli.output;
    let result = match cli.command {
        Command::Run { config, dry_run } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::run::handle(&orchestrator, &config, dry_run, format).await
        }
        Command::Status { ids } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::status::handle(&orchestrator, &ids, format).await
        }
        Command::Kill { id } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::kill::handle(&orchestrator, &id, format).await
        }
        Command::Logs { id } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::logs::handle(&orchestrator, &id).await
        }
        Command::Fetch { id } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::fetch::handle(&orchestrator, &id, format).await
        }
        Command::Resume { id } => {
            let orchestrator = build_orchestrator(cli.db)?;
            commands::resume::handle(&orchestrator, &id, format).await
        }
        Command::Tasks {
            image,
            max_layer_size,
            registry_user,
            registry_password,
        } => {
            let credentials = RegistryCredentials::from_parts(registry_user, registry_password);
            commands::tasks::handle(&image, max_layer_size, credentials, format).await
        }
    };
    result.map_err(ExitError::from)
}

/// Assemble the orchestrator: store, SSH pool, and one executor per
/// backend. The local backend defers container runtime detection to
/// first use, so registration never fails on machines without one.
fn build_orchestrator(db: Option<PathBuf>) -> Result<Orchestrator, ExitError> {
    let root = db.unwrap_or_else(default_db_root);
    let db = ExecutionDb::open(&root)
        .map_err(|e| ExitError::new(1, format!("opening store at {}: {}", root.display(), e)))?;

    let pool = Arc::new(SshConnectionPool::new(Arc::new(OpenSshLauncher)));
    let registry = ExecutorRegistry::new()
        .with(Arc::new(LocalExecutor::new(db.clone())))
        .with(Arc::new(SlurmExecutor::new(db.clone(), Arc::clone(&pool))))
        .with(Arc::new(CloudExecutor::new(db.clone())));

    Ok(Orchestrator::new(db, registry, Arc::new(ShellCommandRenderer), pool))
}

fn default_db_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".ev").join("db"))
        .unwrap_or_else(|| PathBuf::from(".ev-db"))
}
