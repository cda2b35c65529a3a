// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task intermediate representation.
//!
//! Describes one runnable benchmark task exposed by a harness container,
//! discovered from the container's task descriptor file. Rebuilt on demand;
//! never part of job state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique key for a task: `(harness, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub harness: String,
    pub name: String,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.harness, self.name)
    }
}

/// Normalized description of one runnable benchmark task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIr {
    pub name: String,
    pub harness: String,
    /// Image reference of the harness container exposing this task.
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_digest: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Default override fields applied unless the run config overrides them.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl TaskIr {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            harness: self.harness.clone(),
            name: self.name.clone(),
        }
    }
}
