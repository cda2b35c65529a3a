// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit executor registration.
//!
//! Backends are registered here at startup by whoever assembles the
//! process (the CLI's main). There is no import-side-effect discovery and
//! no process-wide table: the registry is an owned value handed to the
//! orchestrator, so tests build their own with fakes.

use ev_backends::Executor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Map from executor name to its constructed backend.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own `name()` (builder style).
    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors
            .insert(executor.name().to_string(), executor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(name)
    }

    /// Registered executor names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}
