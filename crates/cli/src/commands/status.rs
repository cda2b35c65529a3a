// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status command handler

use anyhow::Result;

use crate::output::{handle_list, render_status_table, OutputFormat};
use ev_engine::Orchestrator;

pub async fn handle(
    orchestrator: &Orchestrator,
    ids: &[String],
    format: OutputFormat,
) -> Result<()> {
    let entries = orchestrator.status(ids).await?;
    handle_list(format, &entries, "No jobs found", render_status_table)
}
