// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn local_config() -> RunConfig {
    RunConfig {
        executor: "local".to_string(),
        deployment: DeploymentConfig {
            image: "registry.example.com/harness:1.0".to_string(),
            env: BTreeMap::new(),
        },
        tasks: vec![
            TaskSpec::new("lm-harness", "mmlu"),
            TaskSpec::new("lm-harness", "gsm8k"),
        ],
        local: Some(LocalConfig {
            output_dir: PathBuf::from("/tmp/results"),
            mode: ExecutionMode::Sequential,
            max_concurrent: 4,
        }),
        slurm: None,
        cloud: None,
    }
}

#[test]
fn config_roundtrips_through_json() {
    let config = local_config();
    let json = serde_json::to_string(&config).unwrap();
    let back: RunConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn unknown_fields_are_tolerated() {
    let mut value = serde_json::to_value(local_config()).unwrap();
    value["future_field"] = serde_json::json!({"added": "later"});
    let parsed: RunConfig = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.tasks.len(), 2);
}

#[test]
fn execution_mode_defaults_to_sequential() {
    let json = r#"{"output_dir": "/tmp/out"}"#;
    let local: LocalConfig = serde_json::from_str(json).unwrap();
    assert_eq!(local.mode, ExecutionMode::Sequential);
    assert_eq!(local.max_concurrent, 4);
}
