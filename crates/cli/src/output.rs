// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;
use ev_engine::StatusEntry;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a list as text table or JSON. Handles empty check + format branch.
pub fn handle_list<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    empty_msg: &str,
    render_text: impl FnOnce(&[T]),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{}", empty_msg);
            } else {
                render_text(items);
            }
        }
    }
    Ok(())
}

/// Format-branch helper for non-list commands (run, kill, resume).
///
/// Renders as JSON when `format` is `Json`, otherwise calls `text_fn`.
pub fn format_or_json<T: Serialize>(
    format: OutputFormat,
    data: &T,
    text_fn: impl FnOnce(),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Text => {
            text_fn();
        }
    }
    Ok(())
}

/// Print status entries as an aligned table, state column colored by
/// outcome.
pub fn render_status_table(entries: &[StatusEntry]) {
    let id_w = column_width("JOB", entries.iter().map(|e| e.job_id.as_str().len()));
    let task_w = column_width("TASK", entries.iter().map(|e| e.task.len()));
    let exec_w = column_width("EXECUTOR", entries.iter().map(|e| e.executor.len()));

    println!(
        "{}",
        crate::color::header(&format!(
            "{:<id_w$}  {:<task_w$}  {:<exec_w$}  STATE",
            "JOB", "TASK", "EXECUTOR"
        ))
    );
    for entry in entries {
        let state = match entry.progress {
            Some(p) => format!("{} ({:.0}%)", entry.state, p * 100.0),
            None => entry.state.to_string(),
        };
        println!(
            "{:<id_w$}  {:<task_w$}  {:<exec_w$}  {}",
            entry.job_id.as_str(),
            entry.task,
            entry.executor,
            crate::color::state(entry.state, &state)
        );
    }
}

fn column_width(label: &str, widths: impl Iterator<Item = usize>) -> usize {
    widths.max().unwrap_or(0).max(label.len())
}
