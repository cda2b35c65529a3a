// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived execution state machine.
//!
//! States are derived from the backend on every query, never persisted.
//! Pending → Running → {Success, Failed}; any non-terminal state can move
//! to Killed via an explicit kill. Terminal states are never overwritten.

use crate::id::JobId;
use serde::{Deserialize, Serialize};

/// State of one job as reported by its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created but not yet accepted/started by the backend
    Pending,
    /// Backend reports the job as running
    Running,
    /// Finished with a zero exit
    Success,
    /// Finished with a non-zero exit or backend failure
    Failed,
    /// Cancelled by an explicit kill
    Killed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Killed)
    }

    /// Apply a newly observed state, preserving terminal-state monotonicity.
    ///
    /// Once a job is terminal, later backend reports (e.g. a recycled Slurm
    /// job ID, a pruned container) must not resurrect it.
    pub fn advance(self, observed: ExecutionState) -> ExecutionState {
        if self.is_terminal() {
            self
        } else {
            observed
        }
    }

    /// Inverse of the `Display` form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }
}

crate::simple_display! {
    ExecutionState {
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failed => "failed",
        Killed => "killed",
    }
}

/// Point-in-time status of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub id: JobId,
    pub state: ExecutionState,
    /// Fraction of completed work in `[0, 1]`, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl ExecutionStatus {
    pub fn new(id: JobId, state: ExecutionState) -> Self {
        Self { id, state, progress: None }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
