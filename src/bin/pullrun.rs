//! pullrun - run a command inside an image pulled from Docker Hub.
//!
//! ## Usage
//!
//! ```sh
//! pullrun run <image> <command> [args...]
//! ```
//!
//! The image's layers are fetched and extracted into a fresh sandbox root,
//! then the process re-execs itself as a sandbox child that stages the
//! command binary, detaches into new mount and PID namespaces, chroots into
//! the root, and runs the command. The parent stays outside the chroot so
//! it can remove the root and blob directory after the child exits, and it
//! terminates with the child's exit code.

use std::path::{Path, PathBuf};
use std::process::exit;

use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use pullrun::{
    AuthClient, CommandRunner, CommandSpec, Error, ImageReference, LayerFetcher,
    ManifestClient, SandboxBuilder, exit_code_of, relay,
};

/// Internal re-exec entry point, not part of the public CLI surface.
const SANDBOX_SUBCOMMAND: &str = "__sandbox";

enum Invocation {
    Run {
        image: String,
        command: String,
        args: Vec<String>,
    },
    Sandbox {
        root: PathBuf,
        command: String,
        args: Vec<String>,
    },
}

fn parse_args() -> Result<Invocation, String> {
    let mut args = std::env::args().skip(1);

    match args.next().as_deref() {
        Some("run") => {
            let image = args.next().ok_or("missing image name")?;
            let command = args.next().ok_or("missing command path")?;
            Ok(Invocation::Run {
                image,
                command,
                args: args.collect(),
            })
        }
        Some(sub) if sub == SANDBOX_SUBCOMMAND => {
            let root = PathBuf::from(args.next().ok_or("missing sandbox root")?);
            let command = args.next().ok_or("missing command path")?;
            Ok(Invocation::Sandbox {
                root,
                command,
                args: args.collect(),
            })
        }
        Some(other) => Err(format!("unknown subcommand '{other}'")),
        None => Err("missing subcommand".to_string()),
    }
}

fn usage() -> &'static str {
    "usage: pullrun run <image> <command> [args...]"
}

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr so the child's stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let invocation = match parse_args() {
        Ok(inv) => inv,
        Err(reason) => {
            eprintln!("pullrun: {reason}\n{}", usage());
            exit(pullrun::INFRA_EXIT_CODE);
        }
    };

    let outcome = match invocation {
        Invocation::Run {
            image,
            command,
            args,
        } => run(&image, &command, &args).await,
        Invocation::Sandbox {
            root,
            command,
            args,
        } => sandbox_child(root, command, args).await,
    };

    match outcome {
        Ok(code) => exit(code),
        Err(err) => {
            error!(error = %err, "run failed");
            eprintln!("pullrun: {err}");
            exit(err.exit_code());
        }
    }
}

/// The host-side pipeline: token → manifest → layers → sandboxed child.
async fn run(image: &str, command: &str, args: &[String]) -> pullrun::Result<i32> {
    let image = ImageReference::new(image)?;

    let token = AuthClient::new()?.fetch_token(&image).await?;
    let manifest = ManifestClient::new()?.fetch_manifest(&token, &image).await?;

    // The sandbox root is allocated before fetching so layers extract
    // straight into it.
    let builder = SandboxBuilder::create()?;
    let staging_root = builder.root().to_path_buf();

    // Blob files live outside the root so they never leak into the
    // sandboxed view. The TempDir cleans itself up on drop.
    let blob_dir = tempfile::Builder::new()
        .prefix("pullrun-blobs-")
        .tempdir()?;

    let fetcher = LayerFetcher::new()?;
    let outcome = match fetcher
        .fetch_and_stage(&token, &image, &manifest, blob_dir.path(), builder.root())
        .await
    {
        Ok(()) => spawn_sandboxed(&staging_root, command, args).await,
        Err(err) => Err(err),
    };

    // Only the child entered the chroot; the staged root is still
    // reachable here, so it is removed whether the run succeeded or not.
    cleanup(&staging_root);
    outcome
}

/// Re-execs the current binary as the sandbox child and waits for it.
///
/// The child confines itself and runs the command; stdio is inherited, so
/// relayed output reaches the caller directly. The child's exit code is
/// the run's exit code.
async fn spawn_sandboxed(root: &Path, command: &str, args: &[String]) -> pullrun::Result<i32> {
    let exe = std::env::current_exe()?;

    let status = tokio::process::Command::new(exe)
        .arg(SANDBOX_SUBCOMMAND)
        .arg(root)
        .arg(command)
        .args(args)
        .status()
        .await
        .map_err(|e| Error::Sandbox {
            reason: format!("failed to launch sandbox child: {e}"),
        })?;

    Ok(exit_code_of(&status))
}

/// The confined half of a run: enter the staged root, execute, relay.
async fn sandbox_child(root: PathBuf, command: String, args: Vec<String>) -> pullrun::Result<i32> {
    let builder = SandboxBuilder::from_root(root);
    let _sandbox = builder.build(Path::new(&command))?;

    let spec = CommandSpec {
        path: command,
        args,
    };
    let result = CommandRunner::run(&spec).await?;

    Ok(relay(&result))
}

/// Best-effort removal of the staged sandbox root.
fn cleanup(root: &std::path::Path) {
    if let Err(e) = std::fs::remove_dir_all(root) {
        warn!(root = %root.display(), error = %e, "failed to remove sandbox root");
    }
}
