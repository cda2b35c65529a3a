// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial container-image introspection.
//!
//! Harness images run to many gigabytes, but the task descriptor they
//! expose is a few kilobytes sitting in a small metadata layer. This
//! module talks the registry HTTP API directly (token auth, manifest
//! fetch, per-layer blob streaming) to pull that one file out without
//! ever pulling the image.

mod auth;
mod layers;
mod tasks;

pub use auth::{RegistryAuthenticator, RegistryCredentials};
pub use layers::{LayerSearcher, DEFAULT_MAX_LAYER_SIZE};
pub use tasks::{discover_tasks, TASK_DESCRIPTOR_PATH};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors from registry introspection.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid image reference '{0}'")]
    BadImageRef(String),

    #[error("registry auth failed for {registry}: {reason}")]
    Auth { registry: String, reason: String },

    #[error("manifest fetch failed for {reference}: {reason}")]
    ManifestFetch { reference: String, reason: String },

    #[error("{context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// A layer blob could not be decompressed or scanned.
    #[error("layer {digest} could not be read: {reason}")]
    LayerDecode { digest: String, reason: String },

    /// The searched file lives in no layer under the size threshold.
    ///
    /// This is a best-effort miss, not proof of absence: the operator can
    /// raise the threshold or fall back to a full pull.
    #[error(
        "'{path}' not found in any layer under {max_layer_size} bytes \
         ({layers_searched} searched); raise --max-layer-size or pull the image"
    )]
    FileNotInSmallLayers {
        path: String,
        max_layer_size: u64,
        layers_searched: usize,
    },

    #[error("task descriptor in {reference} is malformed: {reason}")]
    BadDescriptor { reference: String, reason: String },
}

/// A parsed image reference: `registry/repository:tag` or `@digest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    /// Tag or `sha256:...` digest.
    pub reference: String,
}

impl ImageRef {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let bad = || RegistryError::BadImageRef(raw.to_string());

        let (name, reference) = if let Some((name, digest)) = raw.split_once('@') {
            (name, digest.to_string())
        } else {
            // The tag separator is the last ':' after the final '/'.
            match raw.rsplit_once(':') {
                Some((name, tag)) if !tag.contains('/') => (name, tag.to_string()),
                _ => (raw, "latest".to_string()),
            }
        };
        if name.is_empty() || reference.is_empty() {
            return Err(bad());
        }

        // A first segment with a dot or port is a registry hostname.
        let (registry, repository) = match name.split_once('/') {
            Some((head, rest)) if head.contains('.') || head.contains(':') => {
                (head.to_string(), rest.to_string())
            }
            _ => ("registry-1.docker.io".to_string(), name.to_string()),
        };
        if repository.is_empty() {
            return Err(bad());
        }

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sep = if self.reference.starts_with("sha256:") {
            '@'
        } else {
            ':'
        };
        write!(f, "{}/{}{}{}", self.registry, self.repository, sep, self.reference)
    }
}

/// One content-addressed blob reference inside a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: String,
    /// Compressed size in bytes.
    pub size: u64,
}

/// An OCI/Docker v2 image manifest, reduced to what the searcher needs.
///
/// Layers are ordered bottom-to-top: `layers[0]` is the base, the last
/// entry is the most recently added layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub layers: Vec<Descriptor>,
}

/// Seam between the searcher and registry HTTP; tests inject a fake.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn fetch_manifest(
        &self,
        image: &ImageRef,
        token: Option<&str>,
    ) -> Result<Manifest, RegistryError>;

    async fn fetch_blob(
        &self,
        image: &ImageRef,
        digest: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>, RegistryError>;
}

/// Transport backed by the real registry v2 HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn bearer(request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn fetch_manifest(
        &self,
        image: &ImageRef,
        token: Option<&str>,
    ) -> Result<Manifest, RegistryError> {
        let url = format!(
            "https://{}/v2/{}/manifests/{}",
            image.registry, image.repository, image.reference
        );
        let request = self
            .client
            .get(&url)
            .header(
                "Accept",
                "application/vnd.docker.distribution.manifest.v2+json, \
                 application/vnd.oci.image.manifest.v1+json",
            );
        let response = Self::bearer(request, token)
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("fetching manifest {}", url),
                source,
            })?;
        if !response.status().is_success() {
            return Err(RegistryError::ManifestFetch {
                reference: image.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        response
            .json()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("decoding manifest {}", url),
                source,
            })
    }

    async fn fetch_blob(
        &self,
        image: &ImageRef,
        digest: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = format!(
            "https://{}/v2/{}/blobs/{}",
            image.registry, image.repository, digest
        );
        let response = Self::bearer(self.client.get(&url), token)
            .send()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("fetching blob {}", url),
                source,
            })?;
        if !response.status().is_success() {
            return Err(RegistryError::LayerDecode {
                digest: digest.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| RegistryError::Http {
                context: format!("reading blob {}", url),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
