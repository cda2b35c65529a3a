// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logs command handler

use anyhow::Result;

use crate::color;
use ev_engine::Orchestrator;

/// Stream interleaved log lines until every stream ends or Ctrl-C.
///
/// Each line carries a `[job_id task]` tag colored by task index so jobs
/// can be told apart in the interleaved output. Both exit paths wait for
/// the stream's teardown so SSH masters are closed before returning.
pub async fn handle(orchestrator: &Orchestrator, id: &str) -> Result<()> {
    let mut stream = orchestrator.logs(id).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = stream.recv() => match line {
                Some(line) => {
                    let tag = format!("[{} {}]", line.job_id, line.task_name);
                    println!(
                        "{} {}",
                        color::job_tag(line.job_id.task_index(), &tag),
                        line.line
                    );
                }
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }
    stream.finish().await;
    Ok(())
}
