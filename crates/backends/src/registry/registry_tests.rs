// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::auth::parse_bearer_challenge;
use super::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Build a gzipped tar blob holding the given `(path, content)` entries.
fn gzipped_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Canned manifest plus blobs; records which blobs were fetched.
struct FakeTransport {
    manifest: Manifest,
    blobs: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new(layers: Vec<(&str, u64, Vec<u8>)>) -> Self {
        let manifest = Manifest {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            layers: layers
                .iter()
                .map(|(digest, size, _)| Descriptor {
                    media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
                    digest: digest.to_string(),
                    size: *size,
                })
                .collect(),
        };
        let blobs = layers
            .into_iter()
            .map(|(digest, _, blob)| (digest.to_string(), blob))
            .collect();
        Self {
            manifest,
            blobs,
            fetched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl RegistryTransport for FakeTransport {
    async fn fetch_manifest(
        &self,
        _image: &ImageRef,
        _token: Option<&str>,
    ) -> Result<Manifest, RegistryError> {
        Ok(self.manifest.clone())
    }

    async fn fetch_blob(
        &self,
        _image: &ImageRef,
        digest: &str,
        _token: Option<&str>,
    ) -> Result<Vec<u8>, RegistryError> {
        self.fetched.lock().push(digest.to_string());
        self.blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| RegistryError::LayerDecode {
                digest: digest.to_string(),
                reason: "no such blob".to_string(),
            })
    }
}

fn image() -> ImageRef {
    ImageRef::parse("registry.example.com/eval/lmeval:1.2").unwrap()
}

#[test]
fn image_refs_parse_registry_repo_and_tag() {
    let parsed = image();
    assert_eq!(parsed.registry, "registry.example.com");
    assert_eq!(parsed.repository, "eval/lmeval");
    assert_eq!(parsed.reference, "1.2");

    let digest = ImageRef::parse("registry.example.com/eval/lmeval@sha256:abcd").unwrap();
    assert_eq!(digest.reference, "sha256:abcd");
    assert_eq!(digest.to_string(), "registry.example.com/eval/lmeval@sha256:abcd");

    // No registry host means the default registry.
    let bare = ImageRef::parse("alpine:3.18").unwrap();
    assert_eq!(bare.registry, "registry-1.docker.io");
    assert_eq!(bare.repository, "alpine");

    // Untagged defaults to latest.
    let untagged = ImageRef::parse("registry.example.com/eval/lmeval").unwrap();
    assert_eq!(untagged.reference, "latest");

    assert!(ImageRef::parse("").is_err());
}

#[test]
fn credentials_require_a_username() {
    let creds = RegistryCredentials::from_parts(
        Some("robot$puller".to_string()),
        Some("hunter2".to_string()),
    )
    .unwrap();
    assert_eq!(creds.username, "robot$puller");
    assert_eq!(creds.password.as_deref(), Some("hunter2"));

    // Username without password is a valid (identity-only) credential.
    let creds = RegistryCredentials::from_parts(Some("robot$puller".to_string()), None).unwrap();
    assert_eq!(creds.password, None);

    // A stray password with no username stays anonymous.
    assert!(RegistryCredentials::from_parts(None, Some("hunter2".to_string())).is_none());
    assert!(RegistryCredentials::from_parts(None, None).is_none());
}

#[test]
fn bearer_challenges_parse_realm_and_service() {
    let (realm, service) = parse_bearer_challenge(
        r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
    )
    .unwrap();
    assert_eq!(realm, "https://auth.example.com/token");
    assert_eq!(service.as_deref(), Some("registry.example.com"));

    let (realm, service) =
        parse_bearer_challenge(r#"Bearer realm="https://auth.example.com/token""#).unwrap();
    assert_eq!(realm, "https://auth.example.com/token");
    assert_eq!(service, None);

    assert!(parse_bearer_challenge("Basic realm=\"x\"").is_none());
}

#[tokio::test]
async fn search_short_circuits_and_skips_large_layers() {
    let descriptor = br#"{"harness":"lmeval","tasks":[{"name":"gsm8k"}]}"#;
    let transport = Arc::new(FakeTransport::new(vec![
        ("sha256:l1", 2_048, gzipped_tar(&[("etc/motd", b"hello")])),
        (
            "sha256:l2",
            3_072,
            gzipped_tar(&[("opt/eval/tasks.json", descriptor)]),
        ),
        // Declared 50MB; fetching it would mean the filter failed.
        ("sha256:l3", 50 * 1024 * 1024, Vec::new()),
    ]));
    let searcher =
        LayerSearcher::new(Arc::clone(&transport) as Arc<dyn RegistryTransport>)
            .with_max_layer_size(10 * 1024);

    let content = searcher
        .find_file(&image(), None, TASK_DESCRIPTOR_PATH)
        .await
        .unwrap();
    assert_eq!(content, descriptor);

    // Only the matching small layer was fetched: not l3 (too large), and
    // not l1 (search stopped at the l2 hit).
    assert_eq!(*transport.fetched.lock(), vec!["sha256:l2".to_string()]);
}

#[tokio::test]
async fn later_layers_shadow_earlier_ones() {
    let transport = Arc::new(FakeTransport::new(vec![
        ("sha256:base", 1_024, gzipped_tar(&[("opt/eval/tasks.json", b"old")])),
        ("sha256:top", 1_024, gzipped_tar(&[("./opt/eval/tasks.json", b"new")])),
    ]));
    let searcher = LayerSearcher::new(transport).with_max_layer_size(10 * 1024);

    let content = searcher
        .find_file(&image(), None, TASK_DESCRIPTOR_PATH)
        .await
        .unwrap();
    assert_eq!(content, b"new");
}

#[tokio::test]
async fn a_miss_names_the_file_and_the_threshold() {
    let transport = Arc::new(FakeTransport::new(vec![
        ("sha256:l1", 1_024, gzipped_tar(&[("etc/motd", b"hello")])),
        ("sha256:big", 50 * 1024 * 1024, Vec::new()),
    ]));
    let searcher = LayerSearcher::new(transport).with_max_layer_size(4_096);

    let err = searcher
        .find_file(&image(), None, "opt/eval/tasks.json")
        .await
        .unwrap_err();
    match &err {
        RegistryError::FileNotInSmallLayers {
            path,
            max_layer_size,
            layers_searched,
        } => {
            assert_eq!(path, "opt/eval/tasks.json");
            assert_eq!(*max_layer_size, 4_096);
            assert_eq!(*layers_searched, 1);
        }
        other => panic!("expected FileNotInSmallLayers, got {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("opt/eval/tasks.json"));
    assert!(message.contains("4096"));
    assert!(message.contains("--max-layer-size"));
}

#[tokio::test]
async fn discovery_returns_task_ir_records() {
    let descriptor = serde_json::json!({
        "harness": "lmeval",
        "tasks": [{"name": "gsm8k"}, {"name": "mmlu"}],
    });
    let transport = Arc::new(FakeTransport::new(vec![(
        "sha256:meta",
        1_024,
        gzipped_tar(&[("opt/eval/tasks.json", descriptor.to_string().as_bytes())]),
    )]));
    let searcher = LayerSearcher::new(transport).with_max_layer_size(10 * 1024);

    let tasks = discover_tasks(&searcher, &image(), None).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].key().to_string(), "lmeval.gsm8k");
    assert_eq!(tasks[1].container, "registry.example.com/eval/lmeval:1.2");
}
