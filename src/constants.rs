//! # Pipeline Constants
//!
//! Registry endpoints, retry budgets, timeouts, and size limits. These
//! constants are the single source of truth for the bounds enforced
//! throughout the pipeline.

use std::time::Duration;

// =============================================================================
// Registry Endpoints
// =============================================================================

/// Token endpoint of the Docker Hub auth service.
///
/// Format with the repository (e.g. `library/busybox`) to request a
/// pull-scoped bearer token.
pub const AUTH_TOKEN_URL: &str =
    "https://auth.docker.io/token?service=registry.docker.io&scope=repository:{repository}:pull";

/// Base URL of the Docker Hub registry API.
pub const REGISTRY_BASE_URL: &str = "https://registry-1.docker.io/v2";

/// Accept header pinned to the schema-v2 manifest media type.
///
/// Without this header the registry may fall back to the legacy schema-v1
/// payload (`fsLayers`/`blobSum`), which this client does not parse.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Tag pulled when the image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

// =============================================================================
// Retry & Timeouts
// =============================================================================

/// Attempts budget for manifest and layer fetches.
pub const FETCH_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between fetch attempts.
///
/// The effective delay is `base × 2^attempt` plus uniform jitter in [0,1)s.
pub const FETCH_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of the uniform jitter added to each backoff delay.
pub const FETCH_JITTER_MAX: Duration = Duration::from_secs(1);

/// Per-request timeout for every registry call.
///
/// Bounds indefinite hangs against an unresponsive registry; layer blobs
/// can be large, so this is minutes-scale.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Size Limits
// =============================================================================
//
// Bounds disk and memory usage from malformed or malicious images. Layers
// are buffered in memory before verification, so MAX_LAYER_SIZE is also the
// per-layer memory bound.
// =============================================================================

/// Maximum size of a single compressed layer blob (512 MiB).
pub const MAX_LAYER_SIZE: u64 = 512 * 1024 * 1024;

/// Maximum number of layers in a manifest.
pub const MAX_LAYERS: usize = 128;

/// Maximum image name length in bytes.
pub const MAX_IMAGE_NAME_LEN: usize = 255;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit code for infrastructure failures (auth, manifest, layer, sandbox).
///
/// Matches the docker-cli convention of 125 for errors of the runtime
/// itself, keeping them distinguishable from any child exit code.
pub const INFRA_EXIT_CODE: i32 = 125;

/// Exit code when the target command could not be launched.
pub const EXEC_EXIT_CODE: i32 = 127;

// =============================================================================
// Validation
// =============================================================================

/// Validates an image name before it is spliced into registry URLs.
///
/// Accepts lowercase alphanumerics plus `.`, `-`, `_`, the shape of Docker
/// Hub library repository names. Rejects empty, overlong, or
/// separator-containing names so a reference can never alter the request
/// path.
pub fn validate_image_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty image name");
    }
    if name.len() > MAX_IMAGE_NAME_LEN {
        return Err("image name too long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
    {
        return Err("image name contains invalid characters");
    }
    Ok(())
}
