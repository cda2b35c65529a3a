// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local container backend.
//!
//! Runs each task as a container on the invoking machine via Docker or
//! Podman. Containers are launched detached so `status`/`kill`/`logs`
//! from a later CLI process keep working; the `run` process then waits on
//! them (one at a time in sequential mode, bounded-concurrently in
//! parallel mode).

use crate::executor::{pump_child_lines, run_cmd, Executor, ExecutorError, LogLine};
use async_trait::async_trait;
use ev_core::{
    CommandRenderer, ExecutionMode, ExecutionState, ExecutionStatus, InvocationId, JobData,
    LocalConfig, RunConfig,
};
use ev_store::ExecutionDb;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, Semaphore};

/// Environment variable overriding container runtime auto-detection.
pub const RUNTIME_ENV: &str = "EV_CONTAINER_RUNTIME";

/// Marker field set on a record when the operator killed the job.
///
/// Container runtimes report a stopped container the same way as a crashed
/// one, so the kill operation leaves this breadcrumb for status derivation.
const KILLED_FIELD: &str = "killed";

/// Seconds the runtime waits between SIGTERM and SIGKILL on stop.
const STOP_GRACE_SECS: u32 = 10;

/// The locally available container runtime (Docker or Podman).
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    program: String,
}

impl ContainerRuntime {
    /// Auto-detect the runtime.
    ///
    /// Checks [`RUNTIME_ENV`] first, then probes the search path for
    /// `docker` and `podman` in that order. Finding neither is a fatal
    /// configuration error.
    pub fn detect() -> Result<Self, ExecutorError> {
        if let Ok(override_bin) = std::env::var(RUNTIME_ENV) {
            if !override_bin.is_empty() {
                return Ok(Self { program: override_bin });
            }
        }
        for candidate in ["docker", "podman"] {
            if find_on_path(candidate) {
                return Ok(Self {
                    program: candidate.to_string(),
                });
            }
        }
        Err(ExecutorError::BackendUnavailable {
            backend: "local".to_string(),
            reason: format!(
                "no container runtime found; install Docker or Podman, or set {}",
                RUNTIME_ENV
            ),
        })
    }

    /// Use a specific runtime binary (tests, unusual installs).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[&str]) -> Result<String, ExecutorError> {
        run_cmd(&self.program, args).await
    }
}

/// Search the `PATH` entries for an executable file with the given name.
fn find_on_path(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Executor that runs tasks as local containers.
pub struct LocalExecutor {
    db: ExecutionDb,
    runtime: OnceLock<ContainerRuntime>,
}

impl LocalExecutor {
    /// Runtime detection is deferred to first use, so a machine without a
    /// container runtime can still operate on slurm/cloud jobs.
    pub fn new(db: ExecutionDb) -> Self {
        Self {
            db,
            runtime: OnceLock::new(),
        }
    }

    /// Use a specific runtime instead of detecting one (tests).
    pub fn with_runtime(db: ExecutionDb, runtime: ContainerRuntime) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(runtime);
        Self { db, runtime: cell }
    }

    fn runtime(&self) -> Result<&ContainerRuntime, ExecutorError> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let detected = ContainerRuntime::detect()?;
        Ok(self.runtime.get_or_init(|| detected))
    }

    fn local_config<'a>(config: &'a RunConfig) -> Result<&'a LocalConfig, ExecutorError> {
        config.local.as_ref().ok_or(ExecutorError::MissingConfig {
            executor: "local",
            field: "local",
        })
    }

    fn container_name(job: &JobData) -> Result<&str, ExecutorError> {
        job.field("container")
            .ok_or_else(|| ExecutorError::NotFound(format!("{} has no container name", job.job_id)))
    }

    /// Launch one task's container detached and wait for it to finish.
    async fn run_container(&self, job: &JobData, command: &str) -> Result<(), ExecutorError> {
        let container = Self::container_name(job)?;
        let output_dir = job.field("output_dir").unwrap_or(".");
        let image = &job.config.deployment.image;

        let mount = format!("{}:/results", output_dir);
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container.into(),
            "-v".into(),
            mount,
        ];
        for (key, value) in &job.config.deployment.env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(image.clone());
        args.push("bash".into());
        args.push("-c".into());
        args.push(command.to_string());

        let runtime = self.runtime()?;
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::info!(job_id = %job.job_id, %container, "launching container");
        runtime.run(&arg_refs).await?;

        // Detached launch; wait for completion so sequential/bounded modes
        // actually bound resource usage.
        runtime.run(&["wait", container]).await?;
        Ok(())
    }

    async fn container_state(&self, job: &JobData) -> Result<ExecutionState, ExecutorError> {
        let container = Self::container_name(job)?;
        let inspect = self
            .runtime()?
            .run(&[
                "inspect",
                "-f",
                "{{.State.Status}}|{{.State.ExitCode}}",
                container,
            ])
            .await;

        let raw = match inspect {
            Ok(raw) => raw,
            // No such container: either a dry run or not launched yet.
            Err(ExecutorError::CommandFailed { .. }) => return Ok(ExecutionState::Pending),
            Err(e) => return Err(e),
        };

        let (status, exit_code) = raw.split_once('|').unwrap_or((raw.as_str(), "0"));
        let state = match status {
            "created" => ExecutionState::Pending,
            "running" | "paused" | "restarting" | "removing" => ExecutionState::Running,
            "exited" | "dead" => {
                if job.field(KILLED_FIELD) == Some("true") {
                    ExecutionState::Killed
                } else if exit_code.trim() == "0" {
                    ExecutionState::Success
                } else {
                    ExecutionState::Failed
                }
            }
            _ => ExecutionState::Pending,
        };
        Ok(state)
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute_eval(
        &self,
        config: &RunConfig,
        renderer: &dyn CommandRenderer,
        dry_run: bool,
    ) -> Result<InvocationId, ExecutorError> {
        let local = Self::local_config(config)?;
        let invocation = InvocationId::generate();

        // Persist one record per task (and its rendered command) before
        // anything launches, so dry runs leave inspectable artifacts.
        let mut planned: Vec<(JobData, String)> = Vec::with_capacity(config.tasks.len());
        for (index, task) in config.tasks.iter().enumerate() {
            let job_id = invocation.job(index);
            let output_dir = local.output_dir.join(invocation.as_str()).join(format!("{}", index));
            std::fs::create_dir_all(&output_dir).map_err(|source| ExecutorError::Io {
                context: format!("creating output dir {}", output_dir.display()),
                source,
            })?;

            let command = renderer.render(task, config);
            let script = output_dir.join("command.sh");
            std::fs::write(&script, format!("#!/bin/bash\n{}\n", command)).map_err(|source| {
                ExecutorError::Io {
                    context: format!("writing {}", script.display()),
                    source,
                }
            })?;

            let job = JobData::new(job_id.clone(), self.name(), config.clone())
                .with_field("container", format!("ev-{}", job_id))
                .with_field("output_dir", output_dir.display().to_string());
            self.db.write_job(&job)?;
            planned.push((job, command));
        }

        if dry_run {
            tracing::info!(%invocation, tasks = planned.len(), "dry run; nothing launched");
            return Ok(invocation);
        }

        match local.mode {
            ExecutionMode::Sequential => {
                for (job, command) in &planned {
                    self.run_container(job, command).await?;
                }
            }
            ExecutionMode::Parallel => {
                let semaphore = Arc::new(Semaphore::new(local.max_concurrent.max(1)));
                let mut handles = Vec::with_capacity(planned.len());
                for (job, command) in planned {
                    let semaphore = Arc::clone(&semaphore);
                    let this = self.clone_parts();
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        this.run_container(&job, &command).await
                    }));
                }
                for handle in handles {
                    handle.await.map_err(|e| ExecutorError::CommandFailed {
                        context: "parallel worker".to_string(),
                        reason: e.to_string(),
                    })??;
                }
            }
        }

        Ok(invocation)
    }

    async fn get_status(&self, jobs: &[JobData]) -> Result<Vec<ExecutionStatus>, ExecutorError> {
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            let state = self.container_state(job).await?;
            out.push(ExecutionStatus::new(job.job_id.clone(), state));
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

        let runtime = self.runtime()?;
        let container = Self::container_name(job)?;
        let grace = STOP_GRACE_SECS.to_string();
        tracing::info!(job_id = %job.job_id, %container, "stopping container");
        if runtime.run(&["stop", "-t", &grace, container]).await.is_err() {
            // Graceful stop failed; escalate.
            let _ = runtime.run(&["kill", container]).await;
        }

        // Fallback: terminate any lingering runtime process still attached
        // to this container (e.g. an orphaned `docker run` wrapper).
        let _ = run_cmd("pkill", &["-f", container]).await;

        let mut updated = job.clone();
        updated.set_field(KILLED_FIELD, "true");
        self.db.write_job(&updated)?;
        Ok(())
    }

    async fn stream_logs(
        &self,
        jobs: Vec<JobData>,
        tx: mpsc::Sender<LogLine>,
    ) -> Result<(), ExecutorError> {
        let runtime = self.runtime()?;
        let mut pumps = Vec::with_capacity(jobs.len());
        for job in jobs {
            let container = Self::container_name(&job)?.to_string();
            let child = tokio::process::Command::new(runtime.program())
                .args(["logs", "-f", &container])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| ExecutorError::Io {
                    context: format!("spawning {} logs", runtime.program()),
                    source,
                })?;
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

    /// Results are bind-mounted straight into each job's output directory,
    /// so there is nothing to transfer.
    async fn fetch_artifacts(&self, jobs: &[JobData]) -> Result<Vec<PathBuf>, ExecutorError> {
        Ok(jobs
            .iter()
            .filter_map(|job| job.field("output_dir").map(PathBuf::from))
            .collect())
    }
}

impl LocalExecutor {
    /// Cheap clone for moving into parallel worker tasks.
    fn clone_parts(&self) -> Self {
        Self {
            db: self.db.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
