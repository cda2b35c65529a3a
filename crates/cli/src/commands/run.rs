// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run command handler

use anyhow::{Context, Result};
use std::path::Path;

use crate::color;
use crate::output::{format_or_json, OutputFormat};
use ev_core::RunConfig;
use ev_engine::Orchestrator;

pub async fn handle(
    orchestrator: &Orchestrator,
    config_path: &Path,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let config: RunConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", config_path.display()))?;

    let invocation = orchestrator.run(&config, dry_run).await?;

    format_or_json(
        format,
        &serde_json::json!({
            "invocation": invocation.as_str(),
            "executor": config.executor,
            "tasks": config.tasks.len(),
            "dry_run": dry_run,
        }),
        || {
            if dry_run {
                println!(
                    "Dry run: wrote artifacts for invocation {}",
                    color::header(invocation.as_str())
                );
            } else {
                println!(
                    "Started invocation {} ({} task(s) on {})",
                    color::header(invocation.as_str()),
                    config.tasks.len(),
                    color::muted(&config.executor)
                );
            }
        },
    )
}
