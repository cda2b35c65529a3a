// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::builder::styling::{Ansi256Color, Color, Style, Styles};
use std::io::IsTerminal;

pub mod codes {
    /// Section headers: pastel cyan / steel blue
    pub const HEADER: u8 = 74;
    /// Commands and literals: light grey
    pub const LITERAL: u8 = 250;
    /// Descriptions and context: medium grey
    pub const CONTEXT: u8 = 245;
    /// Muted / secondary text: darker grey
    pub const MUTED: u8 = 240;
    /// Success states
    pub const GREEN: u8 = 71;
    /// Failure states
    pub const RED: u8 = 167;
    /// In-flight states
    pub const YELLOW: u8 = 179;
}

/// Per-job palette for interleaved log streams; cycled by task index so a
/// human can visually separate jobs.
const JOB_COLORS: [u8; 6] = [74, 71, 179, 140, 167, 109];

/// Determine if color output should be enabled.
///
/// Priority: `NO_COLOR=1` disables → `COLOR=1` forces → TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Build clap `Styles` using the project palette.
pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .header(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .literal(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::LITERAL)))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::CONTEXT)))))
}

fn fg256(code: u8) -> String {
    format!("\x1b[38;5;{code}m")
}

const RESET: &str = "\x1b[0m";

fn paint(code: u8, text: &str) -> String {
    if should_colorize() {
        format!("{}{}{}", fg256(code), text, RESET)
    } else {
        text.to_string()
    }
}

/// Format text with the header color (steel blue).
pub fn header(text: &str) -> String {
    paint(codes::HEADER, text)
}

/// Format text with the muted color (darker grey).
pub fn muted(text: &str) -> String {
    paint(codes::MUTED, text)
}

/// Color a derived state for status tables.
pub fn state(state: ev_core::ExecutionState, text: &str) -> String {
    use ev_core::ExecutionState::*;
    let code = match state {
        Success => codes::GREEN,
        Failed => codes::RED,
        Killed => codes::RED,
        Running => codes::YELLOW,
        Pending => codes::MUTED,
    };
    paint(code, text)
}

/// Color a log-line tag by the job's task index.
pub fn job_tag(task_index: usize, text: &str) -> String {
    paint(JOB_COLORS[task_index % JOB_COLORS.len()], text)
}

#[cfg(test)]
#[path = "color_tests.rs"]
mod tests;
