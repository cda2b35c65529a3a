// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill command handler

use anyhow::Result;

use crate::output::{format_or_json, OutputFormat};
use ev_engine::Orchestrator;

pub async fn handle(orchestrator: &Orchestrator, id: &str, format: OutputFormat) -> Result<()> {
    let outcome = orchestrator.kill(id).await?;
    format_or_json(format, &outcome, || {
        println!("{}", outcome.message);
    })
}
