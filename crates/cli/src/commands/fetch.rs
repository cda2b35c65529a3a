// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fetch command handler

use anyhow::Result;

use crate::output::{handle_list, OutputFormat};
use ev_engine::Orchestrator;

/// Pull result artifacts and print where they landed.
pub async fn handle(orchestrator: &Orchestrator, id: &str, format: OutputFormat) -> Result<()> {
    let fetched = orchestrator.fetch(id).await?;
    handle_list(format, &fetched, "No artifacts recorded", |dirs| {
        for dir in dirs {
            println!("{}", dir.display());
        }
    })
}
