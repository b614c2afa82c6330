//! # Sandbox Construction
//!
//! Builds the isolated execution root: a fresh uniquely named directory
//! holding the extracted layers and the staged command binary, entered via
//! namespace unshare followed by a chroot.
//!
//! Ordering is load-bearing. Everything must be staged while host paths are
//! still reachable; the process detaches into new mount and PID namespaces
//! *before* the root switch, because unsharing afterwards would not protect
//! the mount table already committed. No step may partially apply: the
//! command never runs in a half-isolated root.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Kernel namespaces the sandbox detaches into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Mount table isolation.
    Mount,
    /// Process-ID isolation.
    Pid,
}

/// Capability seam over the namespace-isolation mechanism.
///
/// Keeps the concrete primitive (direct syscall, helper binary) swappable
/// without touching the builder's sequencing logic.
pub trait IsolationProvider {
    /// Detaches the calling process into new instances of `namespaces`.
    fn isolate(&self, namespaces: &[Namespace]) -> Result<()>;
}

// =============================================================================
// Linux Implementation
// =============================================================================

#[cfg(target_os = "linux")]
mod linux {
    use super::{IsolationProvider, Namespace};
    use crate::error::{Error, Result};

    /// Namespace isolation via the `unshare(2)` syscall.
    pub struct UnshareIsolation;

    impl IsolationProvider for UnshareIsolation {
        fn isolate(&self, namespaces: &[Namespace]) -> Result<()> {
            let mut flags: libc::c_int = 0;
            for ns in namespaces {
                flags |= match ns {
                    Namespace::Mount => libc::CLONE_NEWNS,
                    Namespace::Pid => libc::CLONE_NEWPID,
                };
            }

            // SAFETY: unshare takes no pointers; the flags are valid
            // CLONE_NEW* constants.
            let rc = unsafe { libc::unshare(flags) };
            if rc != 0 {
                return Err(Error::Sandbox {
                    reason: format!(
                        "unshare failed: {} (requires privilege)",
                        std::io::Error::last_os_error()
                    ),
                });
            }
            Ok(())
        }
    }
}

// =============================================================================
// Non-Linux Stub
// =============================================================================

#[cfg(not(target_os = "linux"))]
mod stub {
    use super::{IsolationProvider, Namespace};
    use crate::error::{Error, Result};

    /// Stub isolation for platforms without Linux namespaces.
    pub struct UnshareIsolation;

    impl IsolationProvider for UnshareIsolation {
        fn isolate(&self, _namespaces: &[Namespace]) -> Result<()> {
            Err(Error::Sandbox {
                reason: "namespace isolation requires Linux".to_string(),
            })
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::UnshareIsolation;

#[cfg(not(target_os = "linux"))]
pub use stub::UnshareIsolation;

// =============================================================================
// Sandbox Builder
// =============================================================================

/// A fully constructed sandbox, produced once per process lifetime.
///
/// After [`SandboxBuilder::build`] returns, the filesystem root *is* the
/// staged tree; `path` records where it lived on the host before the
/// switch (useful only to a parent process for cleanup).
#[derive(Debug)]
pub struct SandboxRoot {
    /// Host-side location of the staged tree, as seen before the switch.
    pub path: PathBuf,
    /// Whether image layers were extracted into the root before staging.
    pub is_extracted: bool,
}

/// Builds and enters an isolated execution root.
///
/// Created early so [`root`](Self::root) can receive extracted layers, then
/// consumed by [`build`](Self::build) which stages the binary and performs
/// the unshare + chroot sequence.
pub struct SandboxBuilder {
    root: PathBuf,
    isolation: Box<dyn IsolationProvider>,
}

impl SandboxBuilder {
    /// Allocates a fresh, uniquely named root directory.
    ///
    /// A fixed path must never be reused across invocations: concurrent or
    /// repeated runs would collide, and directory-already-exists would mask
    /// stale layer content. `tempfile` guarantees a new name every time.
    pub fn create() -> Result<Self> {
        Self::with_isolation(Box::new(UnshareIsolation))
    }

    /// Allocates a fresh root with a custom isolation provider.
    pub fn with_isolation(isolation: Box<dyn IsolationProvider>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pullrun-")
            .tempdir()
            .map_err(|e| Error::Sandbox {
                reason: format!("failed to allocate sandbox root: {e}"),
            })?;

        // The directory must outlive this builder; cleanup is the
        // invocation's responsibility after the child exits.
        let root = dir.into_path();
        debug!(root = %root.display(), "allocated sandbox root");

        Ok(Self { root, isolation })
    }

    /// Wraps an already staged root directory.
    ///
    /// Used by the re-exec'd sandbox child, which receives the path of the
    /// root the parent extracted layers into. The parent keeps ownership of
    /// the directory and removes it after the child exits.
    pub fn from_root(root: PathBuf) -> Self {
        Self {
            root,
            isolation: Box::new(UnshareIsolation),
        }
    }

    /// The staging directory layers are extracted into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies the command binary to its mirrored absolute path inside the
    /// root, creating parent directories and preserving mode bits.
    ///
    /// A file already placed at that path by an extracted layer wins: the
    /// image's binary is linked against the image's own libraries, while a
    /// host copy would reference a loader and libc that do not exist inside
    /// the chroot. The host binary is copied only when the layers provided
    /// nothing at that path.
    pub fn stage_command(&self, command_path: &Path) -> Result<PathBuf> {
        let relative = command_path
            .strip_prefix("/")
            .map_err(|_| Error::Sandbox {
                reason: format!(
                    "command path must be absolute: {}",
                    command_path.display()
                ),
            })?;
        let staged = self.root.join(relative);

        if staged.exists() {
            debug!(staged = %staged.display(), "command provided by image layers");
            return Ok(staged);
        }

        if !command_path.exists() {
            return Err(Error::Sandbox {
                reason: format!("command binary not found: {}", command_path.display()),
            });
        }

        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Sandbox {
                reason: format!("failed to mirror {}: {e}", parent.display()),
            })?;
        }

        // fs::copy carries the source permission bits, keeping the
        // executable bit intact.
        fs::copy(command_path, &staged).map_err(|e| Error::Sandbox {
            reason: format!("failed to stage {}: {e}", command_path.display()),
        })?;

        debug!(staged = %staged.display(), "command binary staged");
        Ok(staged)
    }

    /// Stages the command and switches the process into the sandbox.
    ///
    /// Sequence: stage binary → unshare mount + PID namespaces → chroot →
    /// chdir `/`. Any failure aborts before the next step runs.
    pub fn build(self, command_path: &Path) -> Result<SandboxRoot> {
        let is_extracted = fs::read_dir(&self.root)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        self.stage_command(command_path)?;

        self.isolation
            .isolate(&[Namespace::Mount, Namespace::Pid])?;

        enter_root(&self.root)?;

        info!(root = %self.root.display(), "sandbox entered");
        Ok(SandboxRoot {
            path: self.root,
            is_extracted,
        })
    }
}

/// Confines the process's filesystem view to `root`.
#[cfg(unix)]
fn enter_root(root: &Path) -> Result<()> {
    std::os::unix::fs::chroot(root).map_err(|e| Error::Sandbox {
        reason: format!("chroot to {} failed: {e}", root.display()),
    })?;
    std::env::set_current_dir("/").map_err(|e| Error::Sandbox {
        reason: format!("chdir to new root failed: {e}"),
    })?;
    Ok(())
}

#[cfg(not(unix))]
fn enter_root(_root: &Path) -> Result<()> {
    Err(Error::Sandbox {
        reason: "root switch requires a Unix platform".to_string(),
    })
}
