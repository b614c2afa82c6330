//! # Registry Client
//!
//! Token acquisition and manifest fetching against the Docker Hub HTTP API.
//!
//! The flow is two requests: an unauthenticated GET to the auth service for
//! a pull-scoped bearer token, then a GET to the manifest endpoint with that
//! token and an `Accept` header pinned to the schema-v2 media type. Token
//! fetch failure is terminal (every later call needs the token); manifest
//! fetches are retried through [`RetryPolicy`] on transient errors only.

use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    AUTH_TOKEN_URL, DEFAULT_TAG, MANIFEST_MEDIA_TYPE, MAX_LAYERS, NETWORK_TIMEOUT,
    REGISTRY_BASE_URL, validate_image_name,
};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// A validated reference to a Docker Hub library image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    name: String,
}

impl ImageReference {
    /// Validates and wraps an image name (e.g. `busybox`).
    pub fn new(name: &str) -> Result<Self> {
        validate_image_name(name).map_err(|reason| Error::InvalidImageName {
            name: name.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Bare image name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified repository path (`library/<name>`).
    pub fn repository(&self) -> String {
        format!("library/{}", self.name)
    }

    /// Token endpoint URL requesting pull scope for this repository.
    pub fn token_url(&self) -> String {
        AUTH_TOKEN_URL.replace("{repository}", &self.repository())
    }

    /// Manifest endpoint URL for the default tag.
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/{}/manifests/{}",
            REGISTRY_BASE_URL,
            self.repository(),
            DEFAULT_TAG
        )
    }

    /// Blob endpoint URL for a layer digest.
    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/{}/blobs/{}", REGISTRY_BASE_URL, self.repository(), digest)
    }
}

/// Short-lived pull-scoped bearer credential. Never persisted.
#[derive(Debug, Clone)]
pub struct AuthToken {
    value: String,
    repository: String,
}

impl AuthToken {
    /// Raw token value for the `Authorization: Bearer` header.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Repository the token was scoped to.
    pub fn repository(&self) -> &str {
        &self.repository
    }
}

/// JSON body of the auth service's token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// An image manifest: the ordered layer stack (schema v2).
///
/// Order is significant: `layers[0]` is the base, later layers overlay
/// earlier ones. The legacy schema-v1 shape (`fsLayers`/`blobSum`) is not
/// modeled; a v1 payload deserializes to an empty layer list.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

/// Content-addressed descriptor of one layer blob.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Content hash, used as fetch key and local filename.
    pub digest: String,
    /// Blob media type.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Compressed size in bytes, when the registry reports it.
    #[serde(default)]
    pub size: u64,
}

/// Builds the HTTP client shared by all registry calls.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(NETWORK_TIMEOUT)
        .build()
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to build HTTP client: {e}"
            )))
        })
}

/// Obtains pull-scoped bearer tokens from the registry auth service.
pub struct AuthClient {
    http: reqwest::Client,
}

impl AuthClient {
    /// Creates an auth client with the default network timeout.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
        })
    }

    /// Fetches a pull token for `image`.
    ///
    /// Single shot: the token is a prerequisite for every subsequent call,
    /// so any failure here is terminal for the run.
    pub async fn fetch_token(&self, image: &ImageReference) -> Result<AuthToken> {
        debug!(image = image.name(), "requesting pull token");

        let response = self
            .http
            .get(image.token_url())
            .send()
            .await
            .map_err(|e| Error::Auth {
                image: image.name().to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth {
                image: image.name().to_string(),
                reason: format!("token endpoint returned status {}", status.as_u16()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| Error::Auth {
            image: image.name().to_string(),
            reason: format!("malformed token payload: {e}"),
        })?;

        info!(image = image.name(), "obtained pull token");
        Ok(AuthToken {
            value: body.token,
            repository: image.repository(),
        })
    }
}

/// Fetches image manifests with bounded retry.
pub struct ManifestClient {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl ManifestClient {
    /// Creates a manifest client with the default retry policy.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            policy: RetryPolicy::default(),
        })
    }

    /// Creates a manifest client with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            policy,
        })
    }

    /// Fetches the schema-v2 manifest for `image`.
    ///
    /// Transient network errors and 5xx responses are retried up to the
    /// policy budget; 4xx responses fail immediately. Exhausting the budget
    /// re-raises the last error.
    pub async fn fetch_manifest(
        &self,
        token: &AuthToken,
        image: &ImageReference,
    ) -> Result<Manifest> {
        // A token only authorizes the repository it was issued for; a
        // mismatch would earn a 401 from the registry anyway, so fail
        // before spending the request.
        if token.repository() != image.repository() {
            return Err(Error::Manifest {
                image: image.name().to_string(),
                reason: format!(
                    "token scoped to '{}', not '{}'",
                    token.repository(),
                    image.repository()
                ),
                status: None,
            });
        }

        let manifest = self
            .policy
            .run("fetch manifest", || self.fetch_once(token, image))
            .await?;

        if manifest.layers.len() > MAX_LAYERS {
            return Err(Error::Manifest {
                image: image.name().to_string(),
                reason: format!("too many layers: {} > {}", manifest.layers.len(), MAX_LAYERS),
                status: None,
            });
        }

        info!(
            image = image.name(),
            layers = manifest.layers.len(),
            "fetched manifest"
        );
        Ok(manifest)
    }

    async fn fetch_once(&self, token: &AuthToken, image: &ImageReference) -> Result<Manifest> {
        debug!(image = image.name(), "fetching manifest");

        let response = self
            .http
            .get(image.manifest_url())
            .bearer_auth(token.value())
            .header(reqwest::header::ACCEPT, MANIFEST_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| Error::Manifest {
                image: image.name().to_string(),
                reason: e.to_string(),
                status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Manifest {
                image: image.name().to_string(),
                reason: format!("manifest endpoint returned status {}", status.as_u16()),
                status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| Error::Manifest {
            image: image.name().to_string(),
            reason: format!("malformed manifest payload: {e}"),
            status: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_is_library_scoped() {
        let image = ImageReference::new("busybox").unwrap();
        assert_eq!(image.repository(), "library/busybox");
    }

    #[test]
    fn test_token_url_carries_pull_scope() {
        let image = ImageReference::new("busybox").unwrap();
        let url = image.token_url();
        assert!(url.starts_with("https://auth.docker.io/token"));
        assert!(url.contains("scope=repository:library/busybox:pull"));
    }

    #[test]
    fn test_invalid_name_rejected_before_any_request() {
        assert!(matches!(
            ImageReference::new("../etc"),
            Err(Error::InvalidImageName { .. })
        ));
    }

    #[test]
    fn test_manifest_v2_schema_parses_layers_in_order() {
        let body = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                 "size": 10, "digest": "sha256:aaa"},
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                 "size": 20, "digest": "sha256:bbb"}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(body).unwrap();
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[0].digest, "sha256:aaa");
        assert_eq!(manifest.layers[1].digest, "sha256:bbb");
    }

    #[tokio::test]
    async fn test_manifest_fetch_rejects_token_for_other_repository() {
        let token = AuthToken {
            value: "tok".to_string(),
            repository: "library/alpine".to_string(),
        };
        let image = ImageReference::new("busybox").unwrap();
        let client = ManifestClient::new().unwrap();

        // Rejected up front, before any request leaves the process.
        let err = client.fetch_manifest(&token, &image).await.unwrap_err();
        match err {
            Error::Manifest { reason, status, .. } => {
                assert!(reason.contains("library/alpine"));
                assert_eq!(status, None);
            }
            other => panic!("expected manifest error, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_v1_schema_yields_no_layers() {
        // fsLayers/blobSum is deliberately not modeled.
        let body = r#"{
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": "sha256:aaa"}]
        }"#;
        let manifest: Manifest = serde_json::from_str(body).unwrap();
        assert!(manifest.layers.is_empty());
    }
}
