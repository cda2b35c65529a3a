// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The uniform executor contract and its error taxonomy.

use async_trait::async_trait;
use ev_core::{CommandRenderer, ExecutionState, ExecutionStatus, InvocationId, JobData, JobId, RunConfig};
use ev_store::DbError;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from executor operations.
///
/// Low-level transport failures (subprocess, SSH, HTTP) are caught at the
/// executor boundary and re-raised as one of these, with backend detail
/// preserved in the message.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A required external system is missing or unreachable. The message
    /// names the dependency and how to fix it.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Kill was requested for a job that already finished.
    #[error("job {job_id} already {}", describe_terminal(*.state))]
    AlreadyTerminal { job_id: JobId, state: ExecutionState },

    /// Kill was requested before the backend accepted the job.
    #[error("job {job_id} has not been submitted yet; nothing to cancel")]
    NotSubmitted { job_id: JobId },

    /// The backend does not implement this operation. Callers continue
    /// without crashing.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    #[error("{executor} configuration is missing the '{field}' section")]
    MissingConfig {
        executor: &'static str,
        field: &'static str,
    },

    #[error("{context}: {reason}")]
    CommandFailed { context: String, reason: String },

    #[error(transparent)]
    Store(#[from] DbError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_terminal(state: ExecutionState) -> &'static str {
    match state {
        ExecutionState::Success => "completed successfully",
        ExecutionState::Failed => "failed",
        ExecutionState::Killed => "was killed",
        ExecutionState::Pending | ExecutionState::Running => "finished",
    }
}

/// One line of job output, tagged for interleaved display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub job_id: JobId,
    pub task_name: String,
    pub line: String,
}

/// Uniform lifecycle contract implemented by every backend.
///
/// Executors are constructed explicitly at startup and handed their
/// dependencies (the execution DB, connection pools); there is no global
/// registration side channel.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Backend tag recorded in every job this executor owns.
    fn name(&self) -> &'static str;

    /// Launch one job per task in `config`, persisting a record for each.
    ///
    /// With `dry_run`, all submission artifacts (records, rendered
    /// commands, batch scripts) are generated and persisted but nothing is
    /// actually launched.
    async fn execute_eval(
        &self,
        config: &RunConfig,
        renderer: &dyn CommandRenderer,
        dry_run: bool,
    ) -> Result<InvocationId, ExecutorError>;

    /// Derive the current status of each given job from the backend.
    async fn get_status(&self, jobs: &[JobData]) -> Result<Vec<ExecutionStatus>, ExecutorError>;

    /// Best-effort cancellation of one job.
    ///
    /// Checks `get_status` first so a kill on a finished job reports *why*
    /// it cannot be killed (e.g. "already completed successfully").
    async fn kill_job(&self, job: &JobData) -> Result<(), ExecutorError>;

    /// Stream log lines for the given jobs into `tx` until their processes
    /// exit or the receiver is dropped.
    ///
    /// Backends without streaming return [`ExecutorError::Unsupported`];
    /// the orchestrator catches that and continues.
    async fn stream_logs(
        &self,
        jobs: Vec<JobData>,
        tx: mpsc::Sender<LogLine>,
    ) -> Result<(), ExecutorError>;

    /// Pull each job's result artifacts to local storage, returning the
    /// local directories that hold them.
    ///
    /// Backends whose results already live locally just report the
    /// directories; backends without any artifact channel return
    /// [`ExecutorError::Unsupported`].
    async fn fetch_artifacts(&self, jobs: &[JobData]) -> Result<Vec<PathBuf>, ExecutorError>;
}

/// Run a subprocess and return trimmed stdout on success.
///
/// Non-zero exit becomes a `CommandFailed` with stderr in the reason;
/// spawn failure becomes `Io` with the program name in the context.
pub(crate) async fn run_cmd(program: &str, args: &[&str]) -> Result<String, ExecutorError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| ExecutorError::Io {
            context: format!("failed to exec {}", program),
            source,
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ExecutorError::CommandFailed {
            context: format!("{} {}", program, args.first().unwrap_or(&"")),
            reason: stderr.trim().to_string(),
        })
    }
}

/// Forward a child's stdout (and stderr) line-by-line into the log channel.
///
/// Terminates the child if the receiver goes away, escalating from
/// graceful kill to hard kill after a grace period.
pub(crate) async fn pump_child_lines(
    mut child: tokio::process::Child,
    job_id: JobId,
    task_name: String,
    tx: mpsc::Sender<LogLine>,
) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut readers = Vec::new();
    if let Some(out) = stdout {
        readers.push(tokio::spawn(read_lines(
            BufReader::new(out).lines(),
            job_id.clone(),
            task_name.clone(),
            tx.clone(),
        )));
    }
    if let Some(err) = stderr {
        readers.push(tokio::spawn(read_lines(
            BufReader::new(err).lines(),
            job_id.clone(),
            task_name.clone(),
            tx.clone(),
        )));
    }
    drop(tx);

    for reader in readers {
        let _ = reader.await;
    }

    // Readers are done: either the child exited or the receiver dropped.
    // Reap the child, escalating if it lingers.
    match tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            let _ = child.kill().await;
            tracing::debug!(%job_id, "force-killed lingering log child");
        }
    }
}

async fn read_lines<R>(
    mut lines: tokio::io::Lines<R>,
    job_id: JobId,
    task_name: String,
    tx: mpsc::Sender<LogLine>,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        let msg = LogLine {
            job_id: job_id.clone(),
            task_name: task_name.clone(),
            line,
        };
        if tx.send(msg).await.is_err() {
            // Receiver dropped (operator interrupt); stop reading.
            break;
        }
    }
}
