// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing orchestration API.

use crate::registry::ExecutorRegistry;
use ev_backends::{Executor, ExecutorError, LogLine, SshConnectionPool};
use ev_core::{
    CommandRenderer, ExecutionState, ExecutionStatus, InvocationId, JobData, JobId, RunConfig,
};
use ev_store::{DbError, ExecutionDb, Resolved};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Last-known derived state, persisted so terminal states survive backend
/// amnesia (pruned containers, recycled scheduler IDs).
const STATE_FIELD: &str = "state";

/// Errors from orchestrator operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no executor named '{name}'; available: {}", .available.join(", "))]
    UnknownExecutor {
        name: String,
        available: Vec<String>,
    },

    #[error("no task named '{name}'")]
    UnknownTask { name: String },

    #[error("task name '{name}' is ambiguous; use one of: {}", .candidates.join(", "))]
    AmbiguousTask {
        name: String,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Store(#[from] DbError),
}

/// One row of `status` output.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub job_id: JobId,
    pub task: String,
    pub executor: String,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Result of a kill request.
#[derive(Debug, Clone, Serialize)]
pub struct KillOutcome {
    pub killed: bool,
    pub message: String,
}

/// A live log stream and its deferred connection teardown.
///
/// The teardown closes SSH masters once every pump ends, so the caller
/// must drain (or drop) the stream and then [`LogStream::finish`] before
/// its runtime shuts down; otherwise only the `ControlPersist` backstop
/// reaps the masters.
pub struct LogStream {
    rx: mpsc::Receiver<LogLine>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl LogStream {
    /// Next interleaved line; `None` once every stream has ended.
    pub async fn recv(&mut self) -> Option<LogLine> {
        self.rx.recv().await
    }

    /// Stop receiving and wait for the pumps and master teardown.
    pub async fn finish(self) {
        drop(self.rx);
        let _ = self.cleanup.await;
    }
}

/// Owns the execution DB, the executor registry, and the SSH pool, and
/// dispatches operator requests to the backend that owns each job.
pub struct Orchestrator {
    db: ExecutionDb,
    registry: ExecutorRegistry,
    renderer: Arc<dyn CommandRenderer>,
    pool: Arc<SshConnectionPool>,
}

impl Orchestrator {
    pub fn new(
        db: ExecutionDb,
        registry: ExecutorRegistry,
        renderer: Arc<dyn CommandRenderer>,
        pool: Arc<SshConnectionPool>,
    ) -> Self {
        Self {
            db,
            registry,
            renderer,
            pool,
        }
    }

    pub fn db(&self) -> &ExecutionDb {
        &self.db
    }

    fn executor_for(&self, name: &str) -> Result<&Arc<dyn Executor>, EngineError> {
        self.registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownExecutor {
                name: name.to_string(),
                available: self.registry.names(),
            })
    }

    /// Resolve an operator-supplied identifier to its job records, in
    /// task-index order.
    fn jobs_for(&self, id: &str) -> Result<Vec<JobData>, EngineError> {
        let mut jobs = match self.db.resolve(id)? {
            Resolved::Job(job_id) => {
                let job = self
                    .db
                    .get_job(&job_id)?
                    .ok_or_else(|| DbError::NotFound(id.to_string()))?;
                vec![job]
            }
            Resolved::Invocation(invocation) => {
                self.db.get_jobs(&invocation)?.into_values().collect()
            }
        };
        if jobs.is_empty() {
            return Err(DbError::NotFound(id.to_string()).into());
        }
        jobs.sort_by_key(JobData::task_index);
        Ok(jobs)
    }

    /// Launch an evaluation from a resolved configuration.
    pub async fn run(
        &self,
        config: &RunConfig,
        dry_run: bool,
    ) -> Result<InvocationId, EngineError> {
        tracing::info!(
            executor = %config.executor,
            tasks = config.tasks.len(),
            dry_run,
            "starting run"
        );
        let executor = self.executor_for(&config.executor)?;
        let result = executor
            .execute_eval(config, self.renderer.as_ref(), dry_run)
            .await;
        self.pool.cleanup_masters().await;
        Ok(result?)
    }

    /// Current status of every job behind each given identifier.
    pub async fn status(&self, ids: &[String]) -> Result<Vec<StatusEntry>, EngineError> {
        let result = self.status_inner(ids).await;
        self.pool.cleanup_masters().await;
        result
    }

    async fn status_inner(&self, ids: &[String]) -> Result<Vec<StatusEntry>, EngineError> {
        let mut entries = Vec::new();
        for id in ids {
            let jobs = self.jobs_for(id)?;
            entries.extend(self.statuses_for(&jobs).await?);
        }
        Ok(entries)
    }

    /// Derive, merge, and persist the status of the given jobs.
    ///
    /// The backend's observed state is merged with the last persisted one
    /// via [`ExecutionState::advance`], so a terminal state never reverts
    /// even if the backend has since forgotten the job.
    async fn statuses_for(&self, jobs: &[JobData]) -> Result<Vec<StatusEntry>, EngineError> {
        let mut derived: HashMap<JobId, ExecutionStatus> = HashMap::new();
        for (name, group) in group_by_executor(jobs) {
            let executor = self.executor_for(&name)?;
            for status in executor.get_status(&group).await? {
                derived.insert(status.id.clone(), status);
            }
        }

        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs {
            let observed = derived.get(&job.job_id);
            let prior = job
                .field(STATE_FIELD)
                .and_then(ExecutionState::parse)
                .unwrap_or(ExecutionState::Pending);
            let state = prior.advance(
                observed
                    .map(|s| s.state)
                    .unwrap_or(ExecutionState::Pending),
            );
            if state.is_terminal() && state != prior {
                let mut updated = job.clone();
                updated.set_field(STATE_FIELD, state.to_string());
                self.db.write_job(&updated)?;
            }
            entries.push(StatusEntry {
                job_id: job.job_id.clone(),
                task: job.task_name(),
                executor: job.executor.clone(),
                state,
                progress: observed.and_then(|s| s.progress),
            });
        }
        Ok(entries)
    }

    /// Best-effort kill of one job, or every job of an invocation.
    ///
    /// A job that is already terminal is reported (with its final state)
    /// rather than treated as a system error.
    pub async fn kill(&self, id: &str) -> Result<KillOutcome, EngineError> {
        let result = self.kill_inner(id).await;
        self.pool.cleanup_masters().await;
        result
    }

    async fn kill_inner(&self, id: &str) -> Result<KillOutcome, EngineError> {
        let jobs = self.jobs_for(id)?;
        let entries = self.statuses_for(&jobs).await?;

        let mut killed = false;
        let mut messages = Vec::with_capacity(jobs.len());
        for (job, entry) in jobs.iter().zip(&entries) {
            if entry.state.is_terminal() {
                messages.push(format!("{} already {}", job.job_id, entry.state));
                continue;
            }
            let executor = self.executor_for(&job.executor)?;
            match executor.kill_job(job).await {
                Ok(()) => {
                    // Re-read: the backend may have updated the record
                    // during the kill (e.g. the local killed marker).
                    let mut updated = self.db.get_job(&job.job_id)?.unwrap_or_else(|| job.clone());
                    updated.set_field(STATE_FIELD, ExecutionState::Killed.to_string());
                    self.db.write_job(&updated)?;
                    killed = true;
                    messages.push(format!("{} killed", job.job_id));
                }
                Err(e) => messages.push(format!("{}: {}", job.job_id, e)),
            }
        }
        Ok(KillOutcome {
            killed,
            message: messages.join("; "),
        })
    }

    /// Stream interleaved log lines for every job behind `id`.
    ///
    /// Backends that cannot stream are skipped with a warning; the stream
    /// closes once every supporting backend's stream ends, and can be
    /// abandoned at any time (operator interrupt); pumps notice and shut
    /// their children down. The caller must await [`LogStream::finish`] so
    /// SSH masters are torn down before the process exits.
    pub async fn logs(&self, id: &str) -> Result<LogStream, EngineError> {
        let jobs = self.jobs_for(id)?;
        let (tx, rx) = mpsc::channel(256);

        let mut pumps = Vec::new();
        for (name, group) in group_by_executor(&jobs) {
            let executor = Arc::clone(self.executor_for(&name)?);
            let tx = tx.clone();
            pumps.push(tokio::spawn(async move {
                match executor.stream_logs(group, tx).await {
                    Ok(()) => {}
                    Err(ExecutorError::Unsupported { backend, .. }) => {
                        tracing::warn!(%backend, "log streaming not supported; skipping");
                    }
                    Err(e) => {
                        tracing::warn!(executor = %name, error = %e, "log streaming failed");
                    }
                }
            }));
        }
        drop(tx);

        // Masters stay up while streams run; tear down when the last ends.
        let pool = Arc::clone(&self.pool);
        let cleanup = tokio::spawn(async move {
            for pump in pumps {
                let _ = pump.await;
            }
            pool.cleanup_masters().await;
        });
        Ok(LogStream { rx, cleanup })
    }

    /// Pull result artifacts for every job behind `id`, returning the
    /// local directories that hold them.
    pub async fn fetch(&self, id: &str) -> Result<Vec<PathBuf>, EngineError> {
        let result = self.fetch_inner(id).await;
        self.pool.cleanup_masters().await;
        result
    }

    async fn fetch_inner(&self, id: &str) -> Result<Vec<PathBuf>, EngineError> {
        let jobs = self.jobs_for(id)?;
        let mut fetched = Vec::new();
        for (name, group) in group_by_executor(&jobs) {
            let executor = self.executor_for(&name)?;
            fetched.extend(executor.fetch_artifacts(&group).await?);
        }
        Ok(fetched)
    }

    /// Re-execute a prior invocation from its stored config snapshot.
    ///
    /// Produces a new invocation with fresh job records; the original
    /// records are untouched. Accepts a job ID too, resuming that job's
    /// whole invocation.
    pub async fn resume(&self, id: &str) -> Result<InvocationId, EngineError> {
        let result = self.resume_inner(id).await;
        self.pool.cleanup_masters().await;
        result
    }

    async fn resume_inner(&self, id: &str) -> Result<InvocationId, EngineError> {
        let jobs = self.jobs_for(id)?;
        // Job 0's snapshot is the whole invocation's config.
        let first = &jobs[0];
        tracing::info!(
            invocation = %first.invocation_id(),
            executor = %first.executor,
            "resuming invocation"
        );
        let executor = self.executor_for(&first.executor)?;
        let invocation = executor
            .execute_eval(&first.config, self.renderer.as_ref(), false)
            .await?;
        Ok(invocation)
    }
}

fn group_by_executor(jobs: &[JobData]) -> BTreeMap<String, Vec<JobData>> {
    let mut groups: BTreeMap<String, Vec<JobData>> = BTreeMap::new();
    for job in jobs {
        groups.entry(job.executor.clone()).or_default().push(job.clone());
    }
    groups
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
