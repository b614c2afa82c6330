//! # Layer Fetching and Staging
//!
//! Downloads each layer blob by digest and extracts it into the sandbox
//! root, in ascending manifest order so later layers overwrite earlier
//! ones (sequential extraction approximates overlay semantics).
//!
//! Every downloaded blob is verified against its digest before anything is
//! written, so a truncated or tampered body never reaches the staging
//! directory. Extraction rejects path traversal (`..`, absolute paths).

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::{debug, info};

use crate::constants::MAX_LAYER_SIZE;
use crate::error::{Error, Result};
use crate::registry::{AuthToken, ImageReference, LayerDescriptor, Manifest};
use crate::retry::RetryPolicy;

/// Filesystem-safe filename for a layer blob.
///
/// `:` is not portable in filenames, so `sha256:abcd` becomes
/// `sha256_abcd`. The substitution is real; tests pin it.
pub fn blob_file_name(digest: &str) -> String {
    digest.replace(':', "_")
}

/// Downloads and stages image layers into a target root.
pub struct LayerFetcher {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl LayerFetcher {
    /// Creates a fetcher with the default retry policy.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: crate::registry::http_client()?,
            policy: RetryPolicy::default(),
        })
    }

    /// Creates a fetcher with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: crate::registry::http_client()?,
            policy,
        })
    }

    /// Downloads every layer in manifest order and extracts each into
    /// `dest_root`.
    ///
    /// Blobs are persisted under `blob_dir` with digest-derived names, so a
    /// duplicate digest later in the stack simply overwrites an identical
    /// file. An empty layer list is valid: the sandbox stages the target
    /// binary separately.
    pub async fn fetch_and_stage(
        &self,
        token: &AuthToken,
        image: &ImageReference,
        manifest: &Manifest,
        blob_dir: &Path,
        dest_root: &Path,
    ) -> Result<()> {
        fs::create_dir_all(blob_dir)?;
        fs::create_dir_all(dest_root)?;

        for layer in &manifest.layers {
            let data = self.pull_layer(token, image, layer).await?;
            let blob_path = self.save_blob(blob_dir, &layer.digest, &data)?;
            extract_layer(&layer.digest, &data, dest_root)?;
            debug!(
                digest = %layer.digest,
                blob = %blob_path.display(),
                "layer staged"
            );
        }

        info!(
            image = image.name(),
            layers = manifest.layers.len(),
            root = %dest_root.display(),
            "all layers staged"
        );
        Ok(())
    }

    /// Downloads one layer blob, retrying transient failures.
    ///
    /// A non-200 response is fatal and names the digest and status. The
    /// body is verified against the digest before being returned, so a
    /// partial download can never be mistaken for success.
    pub async fn pull_layer(
        &self,
        token: &AuthToken,
        image: &ImageReference,
        layer: &LayerDescriptor,
    ) -> Result<Vec<u8>> {
        if layer.size > MAX_LAYER_SIZE {
            return Err(Error::ImageTooLarge {
                size: layer.size,
                limit: MAX_LAYER_SIZE,
            });
        }

        let data = self
            .policy
            .run("pull layer", || self.pull_once(token, image, layer))
            .await?;

        verify_digest(&layer.digest, &data)?;
        Ok(data)
    }

    async fn pull_once(
        &self,
        token: &AuthToken,
        image: &ImageReference,
        layer: &LayerDescriptor,
    ) -> Result<Vec<u8>> {
        debug!(digest = %layer.digest, "pulling layer blob");

        let response = self
            .http
            .get(image.blob_url(&layer.digest))
            .bearer_auth(token.value())
            .send()
            .await
            .map_err(|e| Error::Layer {
                digest: layer.digest.clone(),
                reason: e.to_string(),
                status: None,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Layer {
                digest: layer.digest.clone(),
                reason: format!("blob endpoint returned status {}", status.as_u16()),
                status: Some(status.as_u16()),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Layer {
            digest: layer.digest.clone(),
            reason: format!("body read failed: {e}"),
            status: None,
        })?;

        if body.len() as u64 > MAX_LAYER_SIZE {
            return Err(Error::ImageTooLarge {
                size: body.len() as u64,
                limit: MAX_LAYER_SIZE,
            });
        }

        Ok(body.to_vec())
    }

    /// Persists a verified blob under its digest-derived filename.
    ///
    /// Content-addressed and overwrite-safe: writing the same digest twice
    /// is idempotent.
    fn save_blob(&self, blob_dir: &Path, digest: &str, data: &[u8]) -> Result<PathBuf> {
        let path = blob_dir.join(blob_file_name(digest));
        fs::write(&path, data).map_err(|e| Error::Layer {
            digest: digest.to_string(),
            reason: format!("failed to persist blob: {e}"),
            status: None,
        })?;
        Ok(path)
    }
}

/// Verifies blob content against a `sha256:<hex>` digest.
fn verify_digest(digest: &str, data: &[u8]) -> Result<()> {
    let expected = match digest.split_once(':') {
        Some(("sha256", hash)) => hash,
        _ => {
            return Err(Error::Layer {
                digest: digest.to_string(),
                reason: "unsupported digest algorithm".to_string(),
                status: None,
            });
        }
    };

    let computed = hex::encode(Sha256::digest(data));
    if computed != expected {
        return Err(Error::Layer {
            digest: digest.to_string(),
            reason: format!("digest mismatch: computed sha256:{computed}"),
            status: None,
        });
    }
    Ok(())
}

/// Extracts one gzip-compressed tar layer into `dest_root`.
///
/// Entries are unpacked in archive order; files already present from an
/// earlier layer are overwritten. Any failure aborts with a fatal layer
/// error: a partially extracted layer is never reported as success.
pub fn extract_layer(digest: &str, data: &[u8], dest_root: &Path) -> Result<()> {
    let layer_err = |reason: String| Error::Layer {
        digest: digest.to_string(),
        reason,
        status: None,
    };

    let decoder = GzDecoder::new(data);
    let mut archive = Archive::new(decoder);
    // Entries in image layers may be read-only directories that later
    // layers still have to write under.
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    for entry in archive
        .entries()
        .map_err(|e| layer_err(format!("not a valid archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| layer_err(format!("corrupt entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| layer_err(format!("invalid entry path: {e}")))?;

        // Component-wise check: `a..b` is a legitimate name, a `..` or
        // root component is an escape attempt.
        let escapes = path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        let path_str = path.to_string_lossy().into_owned();
        drop(path);
        if escapes {
            return Err(Error::PathTraversal { path: path_str });
        }

        entry
            .unpack_in(dest_root)
            .map_err(|e| layer_err(format!("extraction failed at '{path_str}': {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_file_name_substitutes_colon() {
        let name = blob_file_name("sha256:abcd1234");
        assert_eq!(name, "sha256_abcd1234");
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_verify_digest_accepts_matching_content() {
        let data = b"layer bytes";
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(data)));
        assert!(verify_digest(&digest, data).is_ok());
    }

    #[test]
    fn test_verify_digest_rejects_mismatch() {
        let digest =
            "sha256:0000000000000000000000000000000000000000000000000000000000000000";
        assert!(matches!(
            verify_digest(digest, b"other bytes"),
            Err(Error::Layer { .. })
        ));
    }
}
