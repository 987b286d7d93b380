//! Mount backend that drives the GlusterFS command line tools.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{ClusterManager, MountBackend, run_tool};
use crate::error::PluginError;
use crate::types::Scope;

pub const DEFAULT_GLUSTERFS_BIN: &str = "/usr/sbin/glusterfs";
pub const DEFAULT_UMOUNT_BIN: &str = "umount";
pub const DEFAULT_GLUSTER_BIN: &str = "gluster";

/// Attaches volumes with the `glusterfs` FUSE client and detaches them with
/// `umount`.
///
/// With a brick base configured it also manages cluster volumes through the
/// `gluster` CLI, placing each brick at `<peer>:<brick_base>/<name>`.
#[derive(Debug, Clone)]
pub struct GlusterCli {
    glusterfs_bin: PathBuf,
    umount_bin: PathBuf,
    gluster_bin: PathBuf,
    brick_base: Option<PathBuf>,
}

impl Default for GlusterCli {
    fn default() -> Self {
        Self {
            glusterfs_bin: DEFAULT_GLUSTERFS_BIN.into(),
            umount_bin: DEFAULT_UMOUNT_BIN.into(),
            gluster_bin: DEFAULT_GLUSTER_BIN.into(),
            brick_base: None,
        }
    }
}

impl GlusterCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_glusterfs_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.glusterfs_bin = bin.into();
        self
    }

    pub fn with_umount_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.umount_bin = bin.into();
        self
    }

    pub fn with_gluster_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.gluster_bin = bin.into();
        self
    }

    /// Enable cluster management with bricks rooted at `base` on every peer.
    pub fn with_brick_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.brick_base = Some(base.into());
        self
    }

    async fn gluster(&self, args: &[&str]) -> Result<String, PluginError> {
        // Script mode suppresses the interactive confirmation on stop.
        let mut full = vec!["--mode=script"];
        full.extend_from_slice(args);
        run_tool(&self.gluster_bin, &full)
            .await
            .map_err(PluginError::Cluster)
    }
}

/// Arguments for the `glusterfs` client; the mountpoint must come last.
pub fn mount_args(servers: &[String], volume_id: &str, target: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(2 * servers.len() + 3);
    args.push("--volfile-id".into());
    args.push(volume_id.into());
    for server in servers {
        args.push("-s".into());
        args.push(server.into());
    }
    args.push(target.as_os_str().to_owned());
    args
}

/// Brick paths `<peer>:<base>/<name>`, one per peer.
pub fn brick_list(peers: &[String], base: &Path, name: &str) -> Vec<String> {
    peers
        .iter()
        .map(|peer| format!("{peer}:{}", base.join(name).display()))
        .collect()
}

/// Parse `gluster volume list` output into volume names.
pub fn parse_volume_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "No volumes present in cluster")
        .map(str::to_owned)
        .collect()
}

#[async_trait]
impl MountBackend for GlusterCli {
    fn scope(&self) -> Scope {
        Scope::Global
    }

    #[instrument(skip(self))]
    async fn attach(
        &self,
        servers: &[String],
        volume_id: &str,
        target: &Path,
    ) -> Result<(), PluginError> {
        run_tool(&self.glusterfs_bin, mount_args(servers, volume_id, target))
            .await
            .map_err(|reason| {
                warn!(
                    volume_id,
                    servers = %servers.join(", "),
                    path = %target.display(),
                    %reason,
                    "failed to mount volume",
                );
                PluginError::MountFailed {
                    path: target.display().to_string(),
                    reason,
                }
            })?;
        info!(volume_id, path = %target.display(), "glusterfs volume attached");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn detach(&self, target: &Path) -> Result<(), PluginError> {
        run_tool(&self.umount_bin, [target.as_os_str()])
            .await
            .map_err(|reason| {
                warn!(path = %target.display(), %reason, "failed to unmount volume");
                PluginError::UnmountFailed {
                    path: target.display().to_string(),
                    reason,
                }
            })?;
        info!(path = %target.display(), "glusterfs volume detached");
        Ok(())
    }

    fn cluster(&self) -> Option<&dyn ClusterManager> {
        self.brick_base.as_ref().map(|_| self as &dyn ClusterManager)
    }
}

#[async_trait]
impl ClusterManager for GlusterCli {
    async fn volume_exists(&self, name: &str) -> Result<bool, PluginError> {
        let output = self.gluster(&["volume", "list"]).await?;
        Ok(parse_volume_list(&output).iter().any(|v| v == name))
    }

    #[instrument(skip(self))]
    async fn create_volume(&self, name: &str, peers: &[String]) -> Result<(), PluginError> {
        let base = self
            .brick_base
            .as_deref()
            .ok_or_else(|| PluginError::Cluster("no brick base configured".into()))?;
        if peers.is_empty() {
            return Err(PluginError::InvalidArgument(
                "at least one peer is required to create a volume".into(),
            ));
        }

        let replica = peers.len().to_string();
        let bricks = brick_list(peers, base, name);
        let mut args = vec!["volume", "create", name];
        if peers.len() > 1 {
            args.extend(["replica", replica.as_str()]);
        }
        args.extend(["transport", "tcp"]);
        args.extend(bricks.iter().map(String::as_str));
        args.push("force");

        self.gluster(&args).await?;
        self.gluster(&["volume", "start", name]).await?;
        info!(name, replica = peers.len(), "cluster volume created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_volume(&self, name: &str) -> Result<(), PluginError> {
        self.gluster(&["volume", "stop", name]).await?;
        info!(name, "cluster volume stopped");
        Ok(())
    }
}
