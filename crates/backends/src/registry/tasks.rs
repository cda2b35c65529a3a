// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task discovery from harness container descriptors.

use super::{ImageRef, LayerSearcher, RegistryError};
use ev_core::TaskIr;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Fixed in-image path of the descriptor a harness container exposes.
pub const TASK_DESCRIPTOR_PATH: &str = "opt/eval/tasks.json";

#[derive(Debug, Deserialize)]
struct Descriptor {
    harness: String,
    tasks: Vec<DescriptorTask>,
}

#[derive(Debug, Deserialize)]
struct DescriptorTask {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    defaults: BTreeMap<String, String>,
}

/// Discover the tasks a harness image exposes, without pulling it.
pub async fn discover_tasks(
    searcher: &LayerSearcher,
    image: &ImageRef,
    token: Option<&str>,
) -> Result<Vec<TaskIr>, RegistryError> {
    let bytes = searcher
        .find_file(image, token, TASK_DESCRIPTOR_PATH)
        .await?;
    parse_descriptor(image, &bytes)
}

fn parse_descriptor(image: &ImageRef, bytes: &[u8]) -> Result<Vec<TaskIr>, RegistryError> {
    let descriptor: Descriptor =
        serde_json::from_slice(bytes).map_err(|e| RegistryError::BadDescriptor {
            reference: image.to_string(),
            reason: e.to_string(),
        })?;

    let digest = image
        .reference
        .starts_with("sha256:")
        .then(|| image.reference.clone());
    let Descriptor { harness, tasks } = descriptor;
    Ok(tasks
        .into_iter()
        .map(|task| TaskIr {
            name: task.name,
            harness: harness.clone(),
            container: image.to_string(),
            container_digest: digest.clone(),
            description: task.description,
            defaults: task.defaults,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_into_task_ir() {
        let image = ImageRef::parse("registry.example.com/eval/lmeval:1.2").unwrap();
        let body = serde_json::json!({
            "harness": "lmeval",
            "tasks": [
                {"name": "gsm8k", "description": "grade school math",
                 "defaults": {"num_fewshot": "5"}},
                {"name": "mmlu"},
            ],
        });
        let tasks = parse_descriptor(&image, body.to_string().as_bytes()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].harness, "lmeval");
        assert_eq!(tasks[0].name, "gsm8k");
        assert_eq!(tasks[0].defaults.get("num_fewshot").map(String::as_str), Some("5"));
        assert_eq!(tasks[0].container, "registry.example.com/eval/lmeval:1.2");
        assert_eq!(tasks[1].description, "");
    }

    #[test]
    fn malformed_descriptor_is_a_descriptor_error() {
        let image = ImageRef::parse("registry.example.com/eval/lmeval:1.2").unwrap();
        let err = parse_descriptor(&image, b"not json").unwrap_err();
        assert!(matches!(err, RegistryError::BadDescriptor { .. }));
    }
}
