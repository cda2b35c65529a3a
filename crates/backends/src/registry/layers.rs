// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layer-by-layer file search under a byte budget.

use super::{ImageRef, Manifest, RegistryError, RegistryTransport};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;

/// Default ceiling on the compressed size of a layer worth scanning.
pub const DEFAULT_MAX_LAYER_SIZE: u64 = 10 * 1024 * 1024;

/// Finds one file inside an image without pulling the image.
///
/// Layers over `max_layer_size` (compressed) are skipped outright; they
/// are assumed to be model/dependency layers, not metadata layers. The
/// small layers are scanned newest-first, because in overlay layering a
/// later layer's copy of a path shadows an earlier one, and the scan
/// stops at the first hit.
pub struct LayerSearcher {
    transport: Arc<dyn RegistryTransport>,
    max_layer_size: u64,
}

impl LayerSearcher {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport,
            max_layer_size: DEFAULT_MAX_LAYER_SIZE,
        }
    }

    pub fn with_max_layer_size(mut self, max_layer_size: u64) -> Self {
        self.max_layer_size = max_layer_size;
        self
    }

    /// Fetch the manifest and search the small layers for `path`.
    ///
    /// Returns the file's bytes from the most recent small layer that
    /// contains it. A miss is [`RegistryError::FileNotInSmallLayers`], an
    /// actionable failure rather than proof the file does not exist.
    pub async fn find_file(
        &self,
        image: &ImageRef,
        token: Option<&str>,
        path: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let manifest = self.transport.fetch_manifest(image, token).await?;
        self.search_layers(image, token, &manifest, path).await
    }

    async fn search_layers(
        &self,
        image: &ImageRef,
        token: Option<&str>,
        manifest: &Manifest,
        path: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let target = normalize(path);
        let mut searched = 0usize;

        // Manifest order is bottom-to-top; iterate top-down.
        for layer in manifest.layers.iter().rev() {
            if layer.size > self.max_layer_size {
                tracing::debug!(
                    digest = %layer.digest,
                    size = layer.size,
                    "skipping large layer"
                );
                continue;
            }
            searched += 1;
            tracing::debug!(digest = %layer.digest, size = layer.size, "scanning layer");

            let blob = self.transport.fetch_blob(image, &layer.digest, token).await?;
            if let Some(content) = scan_layer(&layer.digest, &blob, &target)? {
                return Ok(content);
            }
        }

        Err(RegistryError::FileNotInSmallLayers {
            path: path.to_string(),
            max_layer_size: self.max_layer_size,
            layers_searched: searched,
        })
    }
}

/// Scan one gzipped tar blob for `target`, reading entry headers until a
/// name match and only then reading content.
fn scan_layer(digest: &str, blob: &[u8], target: &str) -> Result<Option<Vec<u8>>, RegistryError> {
    let decode_err = |reason: String| RegistryError::LayerDecode {
        digest: digest.to_string(),
        reason,
    };

    let mut archive = tar::Archive::new(GzDecoder::new(blob));
    let entries = archive.entries().map_err(|e| decode_err(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| decode_err(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| normalize(&p.to_string_lossy()) == target)
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| decode_err(e.to_string()))?;
        return Ok(Some(content));
    }
    Ok(None)
}

/// Tar entries may carry `./` or leading-slash forms of the same path.
fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}
