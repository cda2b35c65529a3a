// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier resolution.

use crate::orchestrator::EngineError;
use ev_core::TaskIr;

/// Resolve an operator-supplied task identifier against discovered tasks.
///
/// A `harness.task` pair disambiguates by harness. A bare task name works
/// only while it is unique; once two harnesses expose the same name the
/// bare form errors enumerating every `harness.task` candidate instead of
/// picking one arbitrarily.
pub fn resolve_task<'a>(
    requested: &str,
    available: &'a [TaskIr],
) -> Result<&'a TaskIr, EngineError> {
    if let Some((harness, name)) = requested.split_once('.') {
        return available
            .iter()
            .find(|t| t.harness == harness && t.name == name)
            .ok_or_else(|| EngineError::UnknownTask {
                name: requested.to_string(),
            });
    }

    let matches: Vec<&TaskIr> = available.iter().filter(|t| t.name == requested).collect();
    match matches.as_slice() {
        [] => Err(EngineError::UnknownTask {
            name: requested.to_string(),
        }),
        [only] => Ok(only),
        _ => Err(EngineError::AmbiguousTask {
            name: requested.to_string(),
            candidates: matches.iter().map(|t| t.key().to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(harness: &str, name: &str) -> TaskIr {
        TaskIr {
            name: name.to_string(),
            harness: harness.to_string(),
            container: format!("registry.example.com/eval/{harness}:1.0"),
            container_digest: None,
            description: String::new(),
            defaults: Default::default(),
        }
    }

    #[test]
    fn qualified_names_disambiguate_by_harness() {
        let tasks = vec![task("lmeval", "gsm8k"), task("helm", "gsm8k")];
        let resolved = resolve_task("helm.gsm8k", &tasks).unwrap();
        assert_eq!(resolved.harness, "helm");
    }

    #[test]
    fn unique_bare_names_resolve() {
        let tasks = vec![task("lmeval", "gsm8k"), task("helm", "mmlu")];
        assert_eq!(resolve_task("mmlu", &tasks).unwrap().harness, "helm");
    }

    #[test]
    fn colliding_bare_names_enumerate_candidates() {
        let tasks = vec![task("lmeval", "gsm8k"), task("helm", "gsm8k")];
        let err = resolve_task("gsm8k", &tasks).unwrap_err();
        match &err {
            EngineError::AmbiguousTask { candidates, .. } => {
                assert_eq!(candidates, &vec!["lmeval.gsm8k".to_string(), "helm.gsm8k".to_string()]);
            }
            other => panic!("expected AmbiguousTask, got {other}"),
        }
        assert!(err.to_string().contains("lmeval.gsm8k"));
        assert!(err.to_string().contains("helm.gsm8k"));
    }

    #[test]
    fn unknown_names_are_not_found() {
        let tasks = vec![task("lmeval", "gsm8k")];
        assert!(matches!(
            resolve_task("winogrande", &tasks),
            Err(EngineError::UnknownTask { .. })
        ));
        assert!(matches!(
            resolve_task("helm.gsm8k", &tasks),
            Err(EngineError::UnknownTask { .. })
        ));
    }
}
