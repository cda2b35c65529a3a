// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slurm batch backend, driven over SSH.
//!
//! Submission renders an sbatch script locally (so dry runs leave the
//! exact script that would have been submitted), stages it to a per-job
//! run directory on the head node, and parses the scheduler-assigned job
//! ID out of `sbatch`'s output. All remote traffic rides the multiplexed
//! [`SshConnectionPool`].

use crate::executor::{pump_child_lines, Executor, ExecutorError, LogLine};
use crate::ssh::{SshConnectionPool, SshTarget};
use async_trait::async_trait;
use ev_core::{
    CommandRenderer, ExecutionState, ExecutionStatus, InvocationId, JobData, RunConfig,
    SlurmConfig, TaskSpec,
};
use ev_store::ExecutionDb;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Scheduler-assigned ID, set on the record only after `sbatch` accepts.
const SLURM_JOB_ID_FIELD: &str = "slurm_job_id";
/// Run directory on the head node holding the script and `job.out`.
const REMOTE_DIR_FIELD: &str = "remote_dir";
/// Local directory where submission artifacts and fetched results land.
const LOCAL_DIR_FIELD: &str = "local_dir";

/// Executor that submits batch jobs to a Slurm cluster over SSH.
pub struct SlurmExecutor {
    db: ExecutionDb,
    pool: Arc<SshConnectionPool>,
}

impl SlurmExecutor {
    pub fn new(db: ExecutionDb, pool: Arc<SshConnectionPool>) -> Self {
        Self { db, pool }
    }

    fn slurm_config(config: &RunConfig) -> Result<&SlurmConfig, ExecutorError> {
        config.slurm.as_ref().ok_or(ExecutorError::MissingConfig {
            executor: "slurm",
            field: "slurm",
        })
    }

    fn target(slurm: &SlurmConfig) -> SshTarget {
        SshTarget::new(&slurm.username, &slurm.hostname)
    }

    fn target_for(job: &JobData) -> Result<SshTarget, ExecutorError> {
        Self::slurm_config(&job.config).map(Self::target)
    }

    /// Render the sbatch submission script for one task.
    fn render_script(
        job_id: &str,
        remote_dir: &str,
        command: &str,
        task: &TaskSpec,
        slurm: &SlurmConfig,
    ) -> String {
        format!(
            "#!/bin/bash\n\
             #SBATCH --job-name=ev-{job_id}\n\
             #SBATCH --account={account}\n\
             #SBATCH --partition={partition}\n\
             #SBATCH --time={walltime}\n\
             #SBATCH --chdir={remote_dir}\n\
             #SBATCH --output={remote_dir}/job.out\n\
             #SBATCH --error={remote_dir}/job.out\n\
             \n\
             # task: {harness}.{name}\n\
             set -euo pipefail\n\
             {command}\n",
            job_id = job_id,
            account = slurm.account,
            partition = slurm.partition,
            walltime = slurm.walltime,
            remote_dir = remote_dir,
            harness = task.harness,
            name = task.name,
            command = command,
        )
    }

    /// Pull `Submitted batch job 12345` apart.
    fn parse_sbatch_output(stdout: &str) -> Result<String, ExecutorError> {
        stdout
            .lines()
            .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ExecutorError::CommandFailed {
                context: "sbatch".to_string(),
                reason: format!("could not find a job ID in output: {stdout:?}"),
            })
    }

    fn map_state(slurm_state: &str) -> ExecutionState {
        // sacct suffixes cancelled-by-user entries, e.g. "CANCELLED by 1234".
        let head = slurm_state.split_whitespace().next().unwrap_or("");
        match head {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "RESIZING" | "SUSPENDED" => {
                ExecutionState::Pending
            }
            "RUNNING" | "COMPLETING" => ExecutionState::Running,
            "COMPLETED" => ExecutionState::Success,
            "CANCELLED" | "CANCELLED+" => ExecutionState::Killed,
            "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" | "DEADLINE"
            | "PREEMPTED" => ExecutionState::Failed,
            _ => ExecutionState::Pending,
        }
    }

    /// One squeue call covering every queued/running ID; anything the queue
    /// no longer knows falls back to accounting.
    async fn query_states(
        &self,
        target: &SshTarget,
        ids: &[&str],
    ) -> Result<HashMap<String, ExecutionState>, ExecutorError> {
        let mut states = HashMap::new();
        if ids.is_empty() {
            return Ok(states);
        }

        let joined = ids.join(",");
        let squeue = self
            .pool
            .run(target, &format!("squeue -h -j {} -o '%i %T'", joined))
            .await
            .unwrap_or_default();
        for line in squeue.lines() {
            if let Some((id, state)) = line.trim().split_once(' ') {
                states.insert(id.to_string(), Self::map_state(state));
            }
        }

        for id in ids {
            if states.contains_key(*id) {
                continue;
            }
            let sacct = self
                .pool
                .run(
                    target,
                    &format!("sacct -j {} -n -X -o State%30 --parsable2", id),
                )
                .await?;
            let state = sacct
                .lines()
                .next()
                .map(|s| Self::map_state(s.trim()))
                .unwrap_or(ExecutionState::Pending);
            states.insert((*id).to_string(), state);
        }
        Ok(states)
    }

}

#[async_trait]
impl Executor for SlurmExecutor {
    fn name(&self) -> &'static str {
        "slurm"
    }

    async fn execute_eval(
        &self,
        config: &RunConfig,
        renderer: &dyn CommandRenderer,
        dry_run: bool,
    ) -> Result<InvocationId, ExecutorError> {
        let slurm = Self::slurm_config(config)?;
        let target = Self::target(slurm);
        let invocation = InvocationId::generate();

        for (index, task) in config.tasks.iter().enumerate() {
            let job_id = invocation.job(index);
            let remote_dir = slurm
                .remote_base_dir
                .join(invocation.as_str())
                .join(index.to_string());
            let remote_dir = remote_dir.display().to_string();
            let local_dir = slurm
                .output_dir
                .join(invocation.as_str())
                .join(index.to_string());
            std::fs::create_dir_all(&local_dir).map_err(|source| ExecutorError::Io {
                context: format!("creating {}", local_dir.display()),
                source,
            })?;

            let command = renderer.render(task, config);
            let script = Self::render_script(job_id.as_str(), &remote_dir, &command, task, slurm);
            let script_path = local_dir.join("job.sbatch");
            std::fs::write(&script_path, &script).map_err(|source| ExecutorError::Io {
                context: format!("writing {}", script_path.display()),
                source,
            })?;

            // Record exists before submission so a failure mid-loop still
            // leaves inspectable state; the scheduler ID is added after.
            let mut job = JobData::new(job_id.clone(), self.name(), config.clone())
                .with_field(REMOTE_DIR_FIELD, &remote_dir)
                .with_field(LOCAL_DIR_FIELD, local_dir.display().to_string());
            self.db.write_job(&job)?;

            if dry_run {
                continue;
            }

            self.pool
                .run(&target, &format!("mkdir -p {}", remote_dir))
                .await?;
            self.pool
                .upload(
                    &target,
                    &script_path.display().to_string(),
                    &format!("{}/job.sbatch", remote_dir),
                )
                .await?;
            let stdout = self
                .pool
                .run(&target, &format!("sbatch {}/job.sbatch", remote_dir))
                .await?;
            let slurm_id = Self::parse_sbatch_output(&stdout)?;
            tracing::info!(%job_id, %slurm_id, "submitted batch job");

            job.set_field(SLURM_JOB_ID_FIELD, slurm_id);
            self.db.write_job(&job)?;
        }

        if dry_run {
            tracing::info!(%invocation, "dry run; scripts rendered, nothing submitted");
        }
        Ok(invocation)
    }

    async fn get_status(&self, jobs: &[JobData]) -> Result<Vec<ExecutionStatus>, ExecutorError> {
        let Some(first) = jobs.first() else {
            return Ok(Vec::new());
        };
        let target = Self::target_for(first)?;

        let ids: Vec<&str> = jobs
            .iter()
            .filter_map(|j| j.field(SLURM_JOB_ID_FIELD))
            .collect();
        let states = self.query_states(&target, &ids).await?;

        Ok(jobs
            .iter()
            .map(|job| {
                // Never submitted (dry run, or sbatch failed) stays pending.
                let state = job
                    .field(SLURM_JOB_ID_FIELD)
                    .and_then(|id| states.get(id).copied())
                    .unwrap_or(ExecutionState::Pending);
                ExecutionStatus::new(job.job_id.clone(), state)
            })
            .collect())
    }

    async fn kill_job(&self, job: &JobData) -> Result<(), ExecutorError> {
        let statuses = self.get_status(std::slice::from_ref(job)).await?;
        if let Some(status) = statuses.first() {
            if status.state.is_terminal() {
                return Err(ExecutorError::AlreadyTerminal {
                    job_id: job.job_id.clone(),
                    state: status.state,
                });
            }
        }

        let Some(slurm_id) = job.field(SLURM_JOB_ID_FIELD) else {
            return Err(ExecutorError::NotSubmitted {
                job_id: job.job_id.clone(),
            });
        };
        let target = Self::target_for(job)?;
        tracing::info!(job_id = %job.job_id, %slurm_id, "cancelling batch job");
        self.pool
            .run(&target, &format!("scancel {}", slurm_id))
            .await?;
        Ok(())
    }

    async fn stream_logs(
        &self,
        jobs: Vec<JobData>,
        tx: mpsc::Sender<LogLine>,
    ) -> Result<(), ExecutorError> {
        let mut pumps = Vec::with_capacity(jobs.len());
        for job in jobs {
            let target = Self::target_for(&job)?;
            let Some(remote_dir) = job.field(REMOTE_DIR_FIELD) else {
                continue;
            };
            // -F keeps following across the file being created after the
            // job leaves the queue.
            let command = format!("tail -n +1 -F {}/job.out", remote_dir);
            let child = self.pool.spawn(&target, &command).await?;
            pumps.push(tokio::spawn(pump_child_lines(
                child,
                job.job_id.clone(),
                job.task_name(),
                tx.clone(),
            )));
        }
        drop(tx);
        for pump in pumps {
            let _ = pump.await;
        }
        Ok(())
    }

    /// Copy each job's remote run directory back to its local directory.
    async fn fetch_artifacts(&self, jobs: &[JobData]) -> Result<Vec<PathBuf>, ExecutorError> {
        let mut fetched = Vec::new();
        for job in jobs {
            let target = Self::target_for(job)?;
            let (Some(remote_dir), Some(local_dir)) =
                (job.field(REMOTE_DIR_FIELD), job.field(LOCAL_DIR_FIELD))
            else {
                continue;
            };
            std::fs::create_dir_all(local_dir).map_err(|source| ExecutorError::Io {
                context: format!("creating {}", local_dir),
                source,
            })?;
            tracing::info!(job_id = %job.job_id, %remote_dir, "fetching artifacts");
            self.pool.download(&target, remote_dir, local_dir).await?;
            fetched.push(PathBuf::from(local_dir));
        }
        Ok(fetched)
    }
}

#[cfg(test)]
#[path = "slurm_tests.rs"]
mod tests;
