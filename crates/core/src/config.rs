// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved run configuration.
//!
//! Configuration loading and layering happen outside this subsystem; the
//! orchestrator receives a fully-resolved [`RunConfig`] and snapshots it
//! verbatim into every job record, so later `status`/`info` calls stay
//! correct even if the operator's local configuration drifts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How the local backend schedules its containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One container at a time, awaited in task order.
    Sequential,
    /// Bounded concurrent containers.
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential
    }
}

crate::simple_display! {
    ExecutionMode {
        Sequential => "sequential",
        Parallel => "parallel",
    }
}

/// One evaluation task to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    /// Harness that exposes this task (namespaces the task name).
    pub harness: String,
    /// Opaque override fields forwarded to command rendering.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl TaskSpec {
    pub fn new(harness: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            harness: harness.into(),
            overrides: BTreeMap::new(),
        }
    }
}

/// What gets deployed for each task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Container image reference (e.g. `registry.example.com/harness:1.2`).
    pub image: String,
    /// Environment variables injected into every task container.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Local container backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Upper bound on concurrent containers in parallel mode.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

/// Remote batch cluster settings (Slurm over SSH).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlurmConfig {
    pub hostname: String,
    pub username: String,
    pub account: String,
    pub partition: String,
    /// `HH:MM:SS` walltime passed to the scheduler.
    pub walltime: String,
    /// Base directory on the head node for per-job run directories.
    pub remote_base_dir: PathBuf,
    /// Local directory where submission artifacts and pulled results land.
    pub output_dir: PathBuf,
}

/// Managed cloud platform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Platform CLI binary used for submit/status/delete.
    pub cli: String,
    /// Resource shape / node group passed through to the platform.
    #[serde(default)]
    pub resource_shape: Option<String>,
}

/// A fully-resolved run configuration (external collaborator contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Backend tag: `local`, `slurm`, `cloud`, ...
    pub executor: String,
    pub deployment: DeploymentConfig,
    /// Ordered task list; task index in this list becomes the job index.
    pub tasks: Vec<TaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slurm: Option<SlurmConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudConfig>,
}

/// Renders one task into the shell command executed inside its container
/// or batch job. The rendering service itself is an external collaborator;
/// the orchestrator treats the result as an opaque byte string.
pub trait CommandRenderer: Send + Sync {
    fn render(&self, task: &TaskSpec, config: &RunConfig) -> String;
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
