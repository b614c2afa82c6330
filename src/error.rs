//! Error types for the image pull and sandbox pipeline.

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while pulling an image or running a command in it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Token request failed or returned a malformed payload. Never retried.
    #[error("failed to obtain registry token for '{image}': {reason}")]
    Auth { image: String, reason: String },

    /// Manifest fetch failed, either fatally (4xx) or after exhausting retries.
    #[error("failed to fetch manifest for '{image}': {reason}")]
    Manifest {
        image: String,
        reason: String,
        /// HTTP status if the registry answered, `None` for network failures.
        status: Option<u16>,
    },

    /// A specific layer failed to download or extract.
    #[error("layer {digest} failed: {reason}")]
    Layer {
        digest: String,
        reason: String,
        /// HTTP status if the registry answered, `None` for network or
        /// local extraction failures.
        status: Option<u16>,
    },

    /// Image reference failed validation before any network call.
    #[error("invalid image name '{name}': {reason}")]
    InvalidImageName { name: String, reason: String },

    /// Layer or rootfs exceeded a size bound.
    #[error("image exceeds size limit: {size} > {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },

    /// Path traversal attempt detected in a layer archive.
    #[error("path traversal detected in layer: {path}")]
    PathTraversal { path: String },

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// A filesystem-staging or isolation step failed. The sandbox is never
    /// entered half-built.
    #[error("sandbox construction failed: {reason}")]
    Sandbox { reason: String },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// The target command could not be launched at all. Distinct from a
    /// nonzero exit of a command that did run.
    #[error("failed to launch '{path}': {reason}")]
    Exec { path: String, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a retry may be warranted for this error.
    ///
    /// Only network-shaped failures on manifest and layer fetches qualify:
    /// connect errors, timeouts, and 5xx responses. Registry 4xx answers and
    /// everything local (sandbox, exec, extraction, I/O) are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Manifest { status, .. } | Error::Layer { status, .. } => match status {
                Some(code) => *code >= 500,
                None => true,
            },
            _ => false,
        }
    }

    /// Process exit code for an error surfaced to the invoking shell.
    ///
    /// Launch failures use 127 (shell "command not found" convention) so
    /// they stay distinguishable from infrastructure failures, which use
    /// 125. Child exit codes never pass through here.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Exec { .. } => 127,
            _ => 125,
        }
    }
}
