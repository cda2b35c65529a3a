// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent job record.

use crate::config::RunConfig;
use crate::id::{InvocationId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One task's execution, as stored in the execution DB.
///
/// Written once at `run` time; append-only afterwards except for
/// backend-assigned fields (e.g. the Slurm job ID becomes known only after
/// the submission call returns). The `data` map is schema-agnostic: its
/// required keys are determined by `executor` and validated by the
/// executor, not the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    pub job_id: JobId,
    /// Backend tag that owns this job (`local`, `slurm`, `cloud`, ...).
    pub executor: String,
    /// Creation time; used for sorting, log display, and tiebreaking.
    pub timestamp: DateTime<Utc>,
    /// Backend-specific opaque fields.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Snapshot of the resolved configuration that produced this job.
    pub config: RunConfig,
}

impl JobData {
    pub fn new(job_id: JobId, executor: impl Into<String>, config: RunConfig) -> Self {
        Self {
            job_id,
            executor: executor.into(),
            timestamp: Utc::now(),
            data: BTreeMap::new(),
            config,
        }
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.job_id.invocation()
    }

    pub fn task_index(&self) -> usize {
        self.job_id.task_index()
    }

    /// The task spec this job executes, from the config snapshot.
    pub fn task(&self) -> Option<&crate::config::TaskSpec> {
        self.config.tasks.get(self.task_index())
    }

    /// Task name for log tagging; falls back to the job ID.
    pub fn task_name(&self) -> String {
        self.task()
            .map(|t| format!("{}.{}", t.harness, t.name))
            .unwrap_or_else(|| self.job_id.to_string())
    }

    /// Look up a backend-specific data field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Set a backend-specific data field (builder style).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set a backend-assigned field after submission (in-place update).
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
