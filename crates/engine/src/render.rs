// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default command rendering.

use ev_core::{CommandRenderer, RunConfig, TaskSpec};

/// Renders a task into the harness's standard entrypoint invocation.
///
/// `run-eval <harness> <task> [--key value ...]`, with override fields in
/// sorted order so rendered commands are stable across runs.
#[derive(Debug, Default)]
pub struct ShellCommandRenderer;

impl CommandRenderer for ShellCommandRenderer {
    fn render(&self, task: &TaskSpec, _config: &RunConfig) -> String {
        let mut command = format!("run-eval {} {}", task.harness, task.name);
        for (key, value) in &task.overrides {
            command.push_str(&format!(" --{} {}", key, value));
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::DeploymentConfig;

    #[test]
    fn overrides_render_in_sorted_order() {
        let mut task = TaskSpec::new("lmeval", "gsm8k");
        task.overrides.insert("num_fewshot".to_string(), "5".to_string());
        task.overrides.insert("limit".to_string(), "100".to_string());
        let config = RunConfig {
            executor: "local".to_string(),
            deployment: DeploymentConfig::default(),
            tasks: vec![task.clone()],
            local: None,
            slurm: None,
            cloud: None,
        };

        let rendered = ShellCommandRenderer.render(&task, &config);
        assert_eq!(rendered, "run-eval lmeval gsm8k --limit 100 --num_fewshot 5");
    }
}
