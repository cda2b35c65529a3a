// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume command handler

use anyhow::Result;

use crate::color;
use crate::output::{format_or_json, OutputFormat};
use ev_engine::Orchestrator;

pub async fn handle(orchestrator: &Orchestrator, id: &str, format: OutputFormat) -> Result<()> {
    let invocation = orchestrator.resume(id).await?;
    format_or_json(
        format,
        &serde_json::json!({ "invocation": invocation.as_str() }),
        || {
            println!(
                "Resumed {} as invocation {}",
                color::muted(id),
                color::header(invocation.as_str())
            );
        },
    )
}
