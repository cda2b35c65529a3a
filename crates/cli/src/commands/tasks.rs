// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tasks command handler: partial-image task discovery.

use anyhow::Result;
use std::sync::Arc;

use crate::color;
use crate::output::{handle_list, OutputFormat};
use ev_backends::{
    discover_tasks, HttpTransport, ImageRef, LayerSearcher, RegistryAuthenticator,
    RegistryCredentials,
};
use ev_core::TaskIr;

pub async fn handle(
    image: &str,
    max_layer_size: Option<u64>,
    credentials: Option<RegistryCredentials>,
    format: OutputFormat,
) -> Result<()> {
    let image = ImageRef::parse(image)?;

    let mut authenticator = RegistryAuthenticator::new();
    if let Some(credentials) = credentials {
        authenticator = authenticator.with_credentials(credentials);
    }
    let token = authenticator.token_for(&image).await?;

    let mut searcher = LayerSearcher::new(Arc::new(HttpTransport::new()));
    if let Some(max) = max_layer_size {
        searcher = searcher.with_max_layer_size(max);
    }

    let tasks = discover_tasks(&searcher, &image, token.as_deref()).await?;
    handle_list(format, &tasks, "No tasks declared by this image", render_tasks)
}

fn render_tasks(tasks: &[TaskIr]) {
    let name_w = tasks
        .iter()
        .map(|t| t.harness.len() + 1 + t.name.len())
        .max()
        .unwrap_or(0)
        .max("TASK".len());

    println!("{}", color::header(&format!("{:<name_w$}  DESCRIPTION", "TASK")));
    for task in tasks {
        let qualified = format!("{}.{}", task.harness, task.name);
        println!("{:<name_w$}  {}", qualified, color::muted(&task.description));
    }
}
