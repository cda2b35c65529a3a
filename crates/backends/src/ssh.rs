// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH connection pooling via OpenSSH control masters.
//!
//! One operation (submit, poll, tail, kill, artifact pull) often spans
//! many discrete remote commands against the same cluster. The pool
//! drives OpenSSH multiplexing so each distinct `(user, host)` pair costs
//! one handshake: [`SshConnectionPool::setup_masters`] opens a background
//! control master per pair, every later command rides its socket, and
//! [`SshConnectionPool::cleanup_masters`] tears the masters down. Callers
//! must run cleanup on every exit path; `ControlPersist` is only the
//! backstop for a process killed before cleanup could run.

use crate::executor::ExecutorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

/// How long an idle control master stays alive after its last client.
const CONTROL_PERSIST: &str = "10m";

/// A remote SSH endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SshTarget {
    pub hostname: String,
    pub username: String,
}

impl SshTarget {
    pub fn new(username: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

/// Seam between the pool and the actual `ssh`/`scp` binaries.
///
/// Production uses [`OpenSshLauncher`]; tests inject a fake that records
/// commands and returns canned output.
#[async_trait]
pub trait SshLauncher: Send + Sync {
    /// Run a local program to completion and return trimmed stdout.
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ExecutorError>;

    /// Spawn a local program with piped stdout/stderr for streaming.
    fn spawn(&self, program: &str, args: &[String])
        -> Result<tokio::process::Child, ExecutorError>;
}

/// Launcher backed by the real OpenSSH client binaries.
#[derive(Debug, Default)]
pub struct OpenSshLauncher;

#[async_trait]
impl SshLauncher for OpenSshLauncher {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ExecutorError> {
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
            Err(ExecutorError::CommandFailed {
                context: format!("{} {}", program, args.join(" ")),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn spawn(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<tokio::process::Child, ExecutorError> {
        tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Io {
                context: format!("failed to spawn {}", program),
                source,
            })
    }
}

/// Pool of multiplexed SSH connections, keyed by `user@host`.
pub struct SshConnectionPool {
    launcher: Arc<dyn SshLauncher>,
    control_dir: PathBuf,
    // Targets whose master this process has opened or verified.
    verified: Mutex<HashSet<SshTarget>>,
}

impl SshConnectionPool {
    pub fn new(launcher: Arc<dyn SshLauncher>) -> Self {
        Self {
            launcher,
            control_dir: std::env::temp_dir().join("ev-ssh"),
            verified: Mutex::new(HashSet::new()),
        }
    }

    /// Override where control sockets live (tests).
    pub fn with_control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.control_dir = dir.into();
        self
    }

    fn control_path(&self, target: &SshTarget) -> PathBuf {
        self.control_dir.join(format!("cm-{}.sock", target.destination()))
    }

    fn control_opts(&self, target: &SshTarget) -> Vec<String> {
        vec![
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", self.control_path(target).display()),
            "-o".into(),
            format!("ControlPersist={}", CONTROL_PERSIST),
            "-o".into(),
            "BatchMode=yes".into(),
        ]
    }

    /// Make sure a live control master exists for `target`.
    ///
    /// A master left behind by an earlier process (within its persist
    /// window) is reused via `ssh -O check`; otherwise a new background
    /// master is established. An unreachable or unauthenticated host is a
    /// fatal `BackendUnavailable` naming the destination.
    async fn ensure_master(&self, target: &SshTarget) -> Result<(), ExecutorError> {
        if self.verified.lock().contains(target) {
            return Ok(());
        }
        let destination = target.destination();

        std::fs::create_dir_all(&self.control_dir).map_err(|source| ExecutorError::Io {
            context: format!("creating {}", self.control_dir.display()),
            source,
        })?;

        let mut check = self.control_opts(target);
        check.extend(["-O".into(), "check".into(), destination.clone()]);
        if self.launcher.run("ssh", &check).await.is_err() {
            tracing::debug!(%destination, "no live control master; establishing one");
            let mut open = self.control_opts(target);
            open.extend(["-N".into(), "-f".into(), destination.clone()]);
            self.launcher.run("ssh", &open).await.map_err(|e| {
                ExecutorError::BackendUnavailable {
                    backend: "ssh".to_string(),
                    reason: format!(
                        "cannot connect to {}: {}; check network access and ssh-agent keys",
                        destination, e
                    ),
                }
            })?;
        }

        self.verified.lock().insert(target.clone());
        Ok(())
    }

    /// Open one control master per distinct target; idempotent per pair.
    ///
    /// Returns the control socket paths, mostly for inspection and tests.
    pub async fn setup_masters(
        &self,
        targets: &[SshTarget],
    ) -> Result<Vec<PathBuf>, ExecutorError> {
        let mut distinct: Vec<&SshTarget> = Vec::new();
        for target in targets {
            if !distinct.contains(&target) {
                distinct.push(target);
            }
        }
        let mut paths = Vec::with_capacity(distinct.len());
        for target in distinct {
            self.ensure_master(target).await?;
            paths.push(self.control_path(target));
        }
        Ok(paths)
    }

    /// Tear down every master this pool opened.
    ///
    /// Best-effort: teardown failures are logged, never raised, so this is
    /// safe to call on the error path of the operation that used the pool.
    pub async fn cleanup_masters(&self) {
        let targets: Vec<SshTarget> = self.verified.lock().drain().collect();
        for target in targets {
            let destination = target.destination();
            let mut args = self.control_opts(&target);
            args.extend(["-O".into(), "exit".into(), destination.clone()]);
            if let Err(e) = self.launcher.run("ssh", &args).await {
                tracing::warn!(%destination, error = %e, "failed to close control master");
            } else {
                tracing::debug!(%destination, "closed control master");
            }
        }
    }

    /// Run a shell command on the remote host and return its stdout.
    pub async fn run(&self, target: &SshTarget, command: &str) -> Result<String, ExecutorError> {
        self.ensure_master(target).await?;
        let mut args = self.control_opts(target);
        args.extend([target.destination(), command.to_string()]);
        self.launcher.run("ssh", &args).await
    }

    /// Copy a local file to a remote path.
    pub async fn upload(
        &self,
        target: &SshTarget,
        local: &str,
        remote: &str,
    ) -> Result<(), ExecutorError> {
        self.ensure_master(target).await?;
        let mut args = self.control_opts(target);
        args.extend([
            local.to_string(),
            format!("{}:{}", target.destination(), remote),
        ]);
        self.launcher.run("scp", &args).await?;
        Ok(())
    }

    /// Copy a remote directory tree to a local path.
    pub async fn download(
        &self,
        target: &SshTarget,
        remote: &str,
        local: &str,
    ) -> Result<(), ExecutorError> {
        self.ensure_master(target).await?;
        let mut args = self.control_opts(target);
        args.extend([
            "-r".into(),
            format!("{}:{}", target.destination(), remote),
            local.to_string(),
        ]);
        self.launcher.run("scp", &args).await?;
        Ok(())
    }

    /// Spawn a long-running remote command (e.g. `tail -f`) with piped
    /// output for streaming.
    pub async fn spawn(
        &self,
        target: &SshTarget,
        command: &str,
    ) -> Result<tokio::process::Child, ExecutorError> {
        self.ensure_master(target).await?;
        let mut args = self.control_opts(target);
        args.extend([target.destination(), command.to_string()]);
        self.launcher.spawn("ssh", &args)
    }
}

/// Launcher that records every command and replies from a canned table.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;

    #[derive(Default)]
    pub struct FakeLauncher {
        /// `(needle, response)` pairs; the first needle contained in the
        /// joined argument string wins.
        responses: Mutex<Vec<(String, Result<String, String>)>>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, needle: impl Into<String>, output: impl Into<String>) {
            self.responses
                .lock()
                .push((needle.into(), Ok(output.into())));
        }

        pub fn fail(&self, needle: impl Into<String>, stderr: impl Into<String>) {
            self.responses
                .lock()
                .push((needle.into(), Err(stderr.into())));
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .map(|(program, args)| format!("{} {}", program, args.join(" ")))
                .collect()
        }
    }

    #[async_trait]
    impl SshLauncher for FakeLauncher {
        async fn run(&self, program: &str, args: &[String]) -> Result<String, ExecutorError> {
            let joined = format!("{} {}", program, args.join(" "));
            self.calls
                .lock()
                .push((program.to_string(), args.to_vec()));
            let responses = self.responses.lock();
            for (needle, response) in responses.iter() {
                if joined.contains(needle.as_str()) {
                    return match response {
                        Ok(stdout) => Ok(stdout.clone()),
                        Err(stderr) => Err(ExecutorError::CommandFailed {
                            context: joined.clone(),
                            reason: stderr.clone(),
                        }),
                    };
                }
            }
            Ok(String::new())
        }

        fn spawn(
            &self,
            _program: &str,
            _args: &[String],
        ) -> Result<tokio::process::Child, ExecutorError> {
            // Streaming goes through a real child; fakes run `true` so the
            // pump sees a clean EOF.
            tokio::process::Command::new("true")
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| ExecutorError::Io {
                    context: "spawning fake child".to_string(),
                    source,
                })
        }
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
