// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed cloud platform backend.
//!
//! Submission and control go through the platform's own CLI binary
//! (configured per run), which owns authentication and scheduling. The
//! platform offers no log-following endpoint, so `stream_logs` reports
//! itself unsupported and the orchestrator degrades gracefully.

use crate::executor::{run_cmd, Executor, ExecutorError, LogLine};
use async_trait::async_trait;
use ev_core::{
    CloudConfig, CommandRenderer, ExecutionState, ExecutionStatus, InvocationId, JobData,
    RunConfig,
};
use ev_store::ExecutionDb;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Platform-assigned job identifier, known only after submission.
const PLATFORM_JOB_ID_FIELD: &str = "platform_job_id";

/// Executor that submits jobs to a managed compute platform via its CLI.
pub struct CloudExecutor {
    db: ExecutionDb,
}

impl CloudExecutor {
    pub fn new(db: ExecutionDb) -> Self {
        Self { db }
    }

    fn cloud_config(config: &RunConfig) -> Result<&CloudConfig, ExecutorError> {
        config.cloud.as_ref().ok_or(ExecutorError::MissingConfig {
            executor: "cloud",
            field: "cloud",
        })
    }

    fn map_platform_state(raw: &str) -> ExecutionState {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "provisioning" => ExecutionState::Pending,
            "running" | "starting" => ExecutionState::Running,
            "succeeded" | "completed" => ExecutionState::Success,
            "cancelled" | "canceled" | "killed" => ExecutionState::Killed,
            "failed" | "error" => ExecutionState::Failed,
            _ => ExecutionState::Pending,
        }
    }

    /// The platform job ID is the last token of the CLI's last output line.
    fn parse_create_output(stdout: &str) -> Result<String, ExecutorError> {
        stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .next_back()
            .and_then(|l| l.split_whitespace().next_back())
            .map(str::to_string)
            .ok_or_else(|| ExecutorError::CommandFailed {
                context: "job create".to_string(),
                reason: format!("could not find a job ID in output: {stdout:?}"),
            })
    }
}

#[async_trait]
impl Executor for CloudExecutor {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn execute_eval(
        &self,
        config: &RunConfig,
        renderer: &dyn CommandRenderer,
        dry_run: bool,
    ) -> Result<InvocationId, ExecutorError> {
        let cloud = Self::cloud_config(config)?;
        let invocation = InvocationId::generate();

        for (index, task) in config.tasks.iter().enumerate() {
            let job_id = invocation.job(index);
            let command = renderer.render(task, config);

            let mut job = JobData::new(job_id.clone(), self.name(), config.clone())
                .with_field("command", &command);
            self.db.write_job(&job)?;

            if dry_run {
                continue;
            }

            let name = format!("ev-{}", job_id);
            let mut args: Vec<String> = vec![
                "job".into(),
                "create".into(),
                "--name".into(),
                name,
                "--image".into(),
                config.deployment.image.clone(),
            ];
            if let Some(shape) = &cloud.resource_shape {
                args.push("--resource-shape".into());
                args.push(shape.clone());
            }
            for (key, value) in &config.deployment.env {
                args.push("--env".into());
                args.push(format!("{}={}", key, value));
            }
            args.push("--command".into());
            args.push(command);

            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let stdout = run_cmd(&cloud.cli, &arg_refs).await.map_err(|e| match e {
                ExecutorError::Io { source, .. } => ExecutorError::BackendUnavailable {
                    backend: "cloud".to_string(),
                    reason: format!("platform CLI '{}' not found: {}", cloud.cli, source),
                },
                other => other,
            })?;
            let platform_id = Self::parse_create_output(&stdout)?;
            tracing::info!(%job_id, %platform_id, "submitted platform job");

            job.set_field(PLATFORM_JOB_ID_FIELD, platform_id);
            self.db.write_job(&job)?;
        }

        Ok(invocation)
    }

    async fn get_status(&self, jobs: &[JobData]) -> Result<Vec<ExecutionStatus>, ExecutorError> {
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            let Some(platform_id) = job.field(PLATFORM_JOB_ID_FIELD) else {
                out.push(ExecutionStatus::new(job.job_id.clone(), ExecutionState::Pending));
                continue;
            };
            let cloud = Self::cloud_config(&job.config)?;
            let stdout = run_cmd(
                &cloud.cli,
                &["job", "get", platform_id, "--output", "status"],
            )
            .await?;
            out.push(ExecutionStatus::new(
                job.job_id.clone(),
                Self::map_platform_state(&stdout),
            ));
        }
        Ok(out)
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

        let Some(platform_id) = job.field(PLATFORM_JOB_ID_FIELD) else {
            return Err(ExecutorError::NotSubmitted {
                job_id: job.job_id.clone(),
            });
        };
        let cloud = Self::cloud_config(&job.config)?;
        tracing::info!(job_id = %job.job_id, %platform_id, "deleting platform job");
        run_cmd(&cloud.cli, &["job", "delete", platform_id]).await?;
        Ok(())
    }

    async fn stream_logs(
        &self,
        _jobs: Vec<JobData>,
        _tx: mpsc::Sender<LogLine>,
    ) -> Result<(), ExecutorError> {
        Err(ExecutorError::Unsupported {
            backend: "cloud".to_string(),
            operation: "log streaming",
        })
    }

    /// The platform stores results in its own object store; there is no
    /// CLI download endpoint yet.
    async fn fetch_artifacts(&self, _jobs: &[JobData]) -> Result<Vec<PathBuf>, ExecutorError> {
        Err(ExecutorError::Unsupported {
            backend: "cloud".to_string(),
            operation: "artifact fetch",
        })
    }
}

#[cfg(test)]
#[path = "cloud_tests.rs"]
mod tests;
