// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invocation and job identifiers.
//!
//! An invocation groups the jobs launched by one `run` call. Its ID is a
//! short hexadecimal token; each job appends its zero-based task index:
//!
//! ```text
//! invocation_id   a1b2c3d4
//!     job_id      a1b2c3d4.0
//!     job_id      a1b2c3d4.1
//! ```

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Length of a generated invocation token.
pub const INVOCATION_ID_LEN: usize = 8;

/// Identifier for a batch of jobs launched together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(pub SmolStr);

impl InvocationId {
    /// Generate a new random hex token.
    pub fn generate() -> Self {
        Self(SmolStr::new(nanoid::nanoid!(INVOCATION_ID_LEN, &HEX)))
    }

    /// Create from an existing string (parsing/deserialization).
    pub fn from_string(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the job ID for a task index within this invocation.
    pub fn job(&self, task_index: usize) -> JobId {
        JobId(SmolStr::new(format!("{}.{}", self.0, task_index)))
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InvocationId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for InvocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error from parsing a job ID string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobIdParseError {
    #[error("job ID '{0}' is missing the '.' separator")]
    MissingSeparator(String),
    #[error("job ID '{0}' has a non-numeric task index")]
    BadIndex(String),
}

/// Identifier for one task's execution: `{invocation_id}.{task_index}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub SmolStr);

impl JobId {
    /// Parse and validate a `{invocation}.{index}` string.
    pub fn parse(s: &str) -> Result<Self, JobIdParseError> {
        let (_, index) = s
            .rsplit_once('.')
            .ok_or_else(|| JobIdParseError::MissingSeparator(s.to_string()))?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(JobIdParseError::BadIndex(s.to_string()));
        }
        Ok(Self(SmolStr::new(s)))
    }

    /// Create from an existing string without validation (store-internal).
    pub fn from_string(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The invocation this job belongs to.
    pub fn invocation(&self) -> InvocationId {
        match self.0.rsplit_once('.') {
            Some((inv, _)) => InvocationId::from_string(inv),
            None => InvocationId::from_string(self.0.clone()),
        }
    }

    /// Zero-based position of the task within its invocation.
    pub fn task_index(&self) -> usize {
        self.0
            .rsplit_once('.')
            .and_then(|(_, idx)| idx.parse().ok())
            .unwrap_or(0)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
