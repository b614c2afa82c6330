//! # pullrun
//!
//! Runs an arbitrary command inside a minimal root filesystem materialized
//! on demand from a container registry, with mount and PID namespace
//! isolation.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         pullrun                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  AuthClient ──► ManifestClient ──► LayerFetcher            │
//! │  (pull token)   (schema v2,        (blob download + tar    │
//! │                  bounded retry)     extraction, in order)  │
//! │                              │                             │
//! │                              ▼                             │
//! │  SandboxBuilder ───────────► CommandRunner                 │
//! │  (fresh root, staged binary, (exec + capture + relay,      │
//! │   unshare → chroot)           exact exit code)             │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline is strictly sequential per invocation: token → manifest →
//! each layer in manifest order → sandbox → run. Transient network errors
//! on manifest and layer fetches are retried with exponential backoff and
//! jitter; everything else fails the run before the target command ever
//! executes.
//!
//! # Exit-Code Contract
//!
//! The child's exit code passes through to the invoking shell unchanged.
//! Infrastructure failures exit 125; a command that could not be launched
//! at all exits 127. A nonzero exit from the target command is a
//! *successful* run of this system.

pub mod constants;
pub mod error;
pub mod fetcher;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod sandbox;

// Re-exports
pub use constants::*;
pub use error::{Error, Result};
pub use fetcher::{LayerFetcher, blob_file_name, extract_layer};
pub use registry::{AuthClient, AuthToken, ImageReference, LayerDescriptor, Manifest, ManifestClient};
pub use retry::RetryPolicy;
pub use runner::{CommandRunner, CommandSpec, ExecutionResult, exit_code_of, relay};
pub use sandbox::{IsolationProvider, Namespace, SandboxBuilder, SandboxRoot, UnshareIsolation};
