// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod fetch;
pub mod kill;
pub mod logs;
pub mod resume;
pub mod run;
pub mod status;
pub mod tasks;
