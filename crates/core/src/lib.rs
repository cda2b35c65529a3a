// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ev-core: shared types for the evalctl (ev) orchestration CLI

pub mod macros;

pub mod config;
pub mod id;
pub mod job;
pub mod status;
pub mod task;

pub use config::{
    CloudConfig, CommandRenderer, DeploymentConfig, ExecutionMode, LocalConfig, RunConfig,
    SlurmConfig, TaskSpec,
};
pub use id::{InvocationId, JobId, JobIdParseError};
pub use job::JobData;
pub use status::{ExecutionState, ExecutionStatus};
pub use task::{TaskIr, TaskKey};
