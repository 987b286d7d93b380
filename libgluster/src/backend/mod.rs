//! Pluggable mount and cluster backends.
//!
//! The lifecycle controller never shells out or speaks HTTP itself.  It talks
//! to a [`MountBackend`] chosen at startup:
//!
//! | Backend | Attach / detach | Cluster management |
//! |---|---|---|
//! | [`cli::GlusterCli`] | `glusterfs` / `umount` | `gluster volume ...`, only with a brick base |
//! | [`rest::RestCluster`] | delegates to `GlusterCli` | GlusterFS REST endpoint |

pub mod cli;
pub mod rest;

use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::PluginError;
use crate::types::Scope;

/// Makes a remote volume appear at / disappear from a local path.
#[async_trait]
pub trait MountBackend: Send + Sync {
    /// Scope reported to the engine when no override is configured.
    fn scope(&self) -> Scope;

    /// Attach `volume_id` served by `servers` at `target`.
    async fn attach(
        &self,
        servers: &[String],
        volume_id: &str,
        target: &Path,
    ) -> Result<(), PluginError>;

    /// Detach whatever is mounted at `target`.
    async fn detach(&self, target: &Path) -> Result<(), PluginError>;

    /// Cluster management, when this deployment can create and stop volumes.
    fn cluster(&self) -> Option<&dyn ClusterManager> {
        None
    }
}

/// Volume management on the GlusterFS cluster side.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn volume_exists(&self, name: &str) -> Result<bool, PluginError>;

    /// Create and start a volume with one brick per peer.
    async fn create_volume(&self, name: &str, peers: &[String]) -> Result<(), PluginError>;

    async fn stop_volume(&self, name: &str) -> Result<(), PluginError>;
}

/// Run an external tool to completion and return its stdout.
///
/// A spawn failure or a non-zero exit becomes the `Err` string: stderr when
/// the tool wrote any, the exit status otherwise.
pub(crate) async fn run_tool<I, S>(program: &Path, args: I) -> Result<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    debug!(?cmd, "running external tool");

    let output = cmd
        .output()
        .await
        .map_err(|e| format!("{}: {e}", program.display()))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("{} {}", program.display(), output.status))
    } else {
        Err(stderr.to_owned())
    }
}
