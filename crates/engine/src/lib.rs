// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ev-engine: orchestration over the execution backends
//!
//! The [`Orchestrator`] is the operator-facing API: `run`, `status`,
//! `kill`, `logs`, `fetch`, `resume`. It owns the execution DB and an explicit
//! [`ExecutorRegistry`] built at startup, resolves operator-supplied IDs
//! (including partial prefixes) to stored job records, and dispatches
//! each record to the backend that owns it.

pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod resolve;

pub use orchestrator::{EngineError, KillOutcome, LogStream, Orchestrator, StatusEntry};
pub use registry::ExecutorRegistry;
pub use render::ShellCommandRenderer;
pub use resolve::resolve_task;
