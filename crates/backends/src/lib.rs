// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ev-backends: execution backends for evalctl
//!
//! Every backend implements the [`Executor`] contract over a different
//! system of record:
//!
//! - [`LocalExecutor`]: containers on the invoking machine (Docker/Podman)
//! - [`SlurmExecutor`]: batch jobs on an SSH-reachable cluster head node
//! - [`CloudExecutor`]: jobs on a managed compute platform (via its CLI)
//!
//! Shared plumbing: [`ssh::SshConnectionPool`] multiplexes remote
//! connections, and [`registry`] does partial-image task discovery without
//! pulling multi-gigabyte harness images.

pub mod cloud;
pub mod executor;
pub mod local;
pub mod registry;
pub mod slurm;
pub mod ssh;

pub use cloud::CloudExecutor;
pub use executor::{Executor, ExecutorError, LogLine};
pub use local::{ContainerRuntime, LocalExecutor};
pub use registry::{
    discover_tasks, HttpTransport, ImageRef, LayerSearcher, Manifest, RegistryAuthenticator,
    RegistryCredentials, RegistryError, RegistryTransport, TASK_DESCRIPTOR_PATH,
};
pub use slurm::SlurmExecutor;
pub use ssh::{OpenSshLauncher, SshConnectionPool, SshLauncher, SshTarget};
