// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn terminal_states_are_terminal() {
    assert!(!ExecutionState::Pending.is_terminal());
    assert!(!ExecutionState::Running.is_terminal());
    assert!(ExecutionState::Success.is_terminal());
    assert!(ExecutionState::Failed.is_terminal());
    assert!(ExecutionState::Killed.is_terminal());
}

#[test]
fn advance_moves_through_lifecycle() {
    let s = ExecutionState::Pending.advance(ExecutionState::Running);
    assert_eq!(s, ExecutionState::Running);
    let s = s.advance(ExecutionState::Success);
    assert_eq!(s, ExecutionState::Success);
}

#[test]
fn advance_never_overwrites_terminal_state() {
    for terminal in [
        ExecutionState::Success,
        ExecutionState::Failed,
        ExecutionState::Killed,
    ] {
        assert_eq!(terminal.advance(ExecutionState::Running), terminal);
        assert_eq!(terminal.advance(ExecutionState::Pending), terminal);
    }
}

#[test]
fn kill_applies_from_any_non_terminal_state() {
    assert_eq!(
        ExecutionState::Pending.advance(ExecutionState::Killed),
        ExecutionState::Killed
    );
    assert_eq!(
        ExecutionState::Running.advance(ExecutionState::Killed),
        ExecutionState::Killed
    );
}

#[test]
fn state_serializes_as_snake_case() {
    let json = serde_json::to_string(&ExecutionState::Running).unwrap();
    assert_eq!(json, "\"running\"");
}
