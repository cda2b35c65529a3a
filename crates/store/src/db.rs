// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key-value store for job records.
//!
//! Every CLI command is a fresh process, so all cross-invocation state
//! lives here. Layout is one directory per invocation with one JSON file
//! per job:
//!
//! ```text
//! <root>/
//!   a1b2c3d4/
//!     a1b2c3d4.0.json
//!     a1b2c3d4.1.json
//! ```
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename, so a concurrent reader never observes a partially written
//! record and two processes writing different jobs cannot corrupt each
//! other.

use ev_core::{InvocationId, JobData, JobId};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from execution DB operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A record file exists but cannot be parsed. Surfaced, never dropped.
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no job or invocation matches '{0}'")]
    NotFound(String),
    #[error("'{prefix}' is ambiguous; matches: {}", .candidates.join(", "))]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Result of resolving an operator-supplied identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Job(JobId),
    Invocation(InvocationId),
}

/// Durable, multi-process-safe store of job records.
#[derive(Debug, Clone)]
pub struct ExecutionDb {
    root: PathBuf,
}

impl ExecutionDb {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DbError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| DbError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, job_id: &JobId) -> PathBuf {
        self.root
            .join(job_id.invocation().as_str())
            .join(format!("{}.json", job_id))
    }

    /// Upsert a job record by its ID.
    pub fn write_job(&self, job: &JobData) -> Result<(), DbError> {
        let path = self.record_path(&job.job_id);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|source| DbError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let bytes = serde_json::to_vec_pretty(job).map_err(|source| DbError::Corrupt {
            path: path.clone(),
            source,
        })?;

        // Atomic replace: temp file in the same directory, then rename.
        let tmp = dir.join(format!(".{}.tmp", job.job_id));
        {
            let mut file = fs::File::create(&tmp).map_err(|source| DbError::Io {
                path: tmp.clone(),
                source,
            })?;
            file.write_all(&bytes).map_err(|source| DbError::Io {
                path: tmp.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| DbError::Io {
                path: tmp.clone(),
                source,
            })?;
        }
        fs::rename(&tmp, &path).map_err(|source| DbError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(job_id = %job.job_id, path = %path.display(), "wrote job record");
        Ok(())
    }

    /// Fetch a job record by exact ID. Missing records are `None`, not errors.
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<JobData>, DbError> {
        let path = self.record_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_record(&path).map(Some)
    }

    /// All jobs of one invocation, keyed by job ID.
    pub fn get_jobs(&self, invocation: &InvocationId) -> Result<BTreeMap<JobId, JobData>, DbError> {
        let dir = self.root.join(invocation.as_str());
        let mut jobs = BTreeMap::new();
        if !dir.exists() {
            return Ok(jobs);
        }
        for entry in list_dir(&dir)? {
            if entry.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = self.read_record(&entry)?;
            jobs.insert(record.job_id.clone(), record);
        }
        Ok(jobs)
    }

    /// Resolve an operator-supplied identifier to a unique job or invocation.
    ///
    /// Job IDs contain a literal `.`; bare tokens are tried as invocation
    /// IDs. Any unambiguous prefix resolves to the unique full match; an
    /// ambiguous prefix errors naming every candidate.
    pub fn resolve(&self, id: &str) -> Result<Resolved, DbError> {
        if id.contains('.') {
            let candidates = self.matching_job_ids(id)?;
            return match candidates.as_slice() {
                [] => Err(DbError::NotFound(id.to_string())),
                [only] => Ok(Resolved::Job(only.clone())),
                _ => {
                    // An exact match is never ambiguous with longer IDs.
                    if let Some(exact) = candidates.iter().find(|c| c.as_str() == id) {
                        return Ok(Resolved::Job(exact.clone()));
                    }
                    Err(DbError::Ambiguous {
                        prefix: id.to_string(),
                        candidates: candidates.iter().map(|c| c.to_string()).collect(),
                    })
                }
            };
        }

        let candidates = self.matching_invocations(id)?;
        match candidates.as_slice() {
            [] => Err(DbError::NotFound(id.to_string())),
            [only] => Ok(Resolved::Invocation(only.clone())),
            _ => {
                if let Some(exact) = candidates.iter().find(|c| c.as_str() == id) {
                    return Ok(Resolved::Invocation(exact.clone()));
                }
                Err(DbError::Ambiguous {
                    prefix: id.to_string(),
                    candidates: candidates.iter().map(|c| c.to_string()).collect(),
                })
            }
        }
    }

    /// All invocation IDs currently stored.
    pub fn invocations(&self) -> Result<Vec<InvocationId>, DbError> {
        let mut out = Vec::new();
        for entry in list_dir(&self.root)? {
            if entry.is_dir() {
                if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                    out.push(InvocationId::from_string(name));
                }
            }
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(out)
    }

    fn matching_invocations(&self, prefix: &str) -> Result<Vec<InvocationId>, DbError> {
        Ok(self
            .invocations()?
            .into_iter()
            .filter(|inv| inv.as_str().starts_with(prefix))
            .collect())
    }

    fn matching_job_ids(&self, prefix: &str) -> Result<Vec<JobId>, DbError> {
        // The invocation part of a job-ID prefix is complete up to the dot,
        // so only invocations matching that part need scanning.
        let inv_part = prefix.split('.').next().unwrap_or(prefix);
        let mut out = Vec::new();
        for inv in self.matching_invocations(inv_part)? {
            for job_id in self.get_jobs(&inv)?.into_keys() {
                if job_id.as_str().starts_with(prefix) {
                    out.push(job_id);
                }
            }
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(out)
    }

    fn read_record(&self, path: &Path) -> Result<JobData, DbError> {
        let bytes = fs::read(path).map_err(|source| DbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DbError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, DbError> {
    let entries = fs::read_dir(dir).map_err(|source| DbError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DbError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        out.push(entry.path());
    }
    Ok(out)
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
