//! Command line and environment configuration of the plugin daemon.
//!
//! Every flag can also be supplied through an environment variable, which is
//! how the managed-plugin `config.json` passes settings in:
//!
//! - `GLUSTER_SERVERS`: comma separated GlusterFS servers (required).
//! - `GLUSTER_ROOT`: directory holding the per-volume mountpoints.
//! - `GLUSTER_GFS_BASE`: brick base directory; enables volume creation on
//!   the cluster through the `gluster` CLI (or the REST endpoint).
//! - `GLUSTER_REST`: GlusterFS REST endpoint; selects the REST backend.
//! - `GLUSTER_UID` / `GLUSTER_GID`: owner of freshly mounted volumes.
//! - `GLUSTER_SCOPE`: `local` or `global`, overrides the backend default.
//! - `GLUSTER_PLUGIN_SOCKET`: plugin socket path.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use libgluster::backend::cli::{
    DEFAULT_GLUSTER_BIN, DEFAULT_GLUSTERFS_BIN, DEFAULT_UMOUNT_BIN, GlusterCli,
};
use libgluster::backend::rest::RestCluster;
use libgluster::{DriverConfig, MountBackend, Ownership, Scope};

pub const DEFAULT_ROOT: &str = "/var/lib/docker-volumes/_glusterfs";
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/glusterfs.sock";
pub const DEFAULT_BRICK_BASE: &str = "/mnt/gfs";

#[derive(Parser, Debug)]
#[command(name = "rkgluster")]
#[command(author, version, about = "GlusterFS volume plugin for Docker", long_about = None)]
pub struct PluginArgs {
    /// GlusterFS servers, comma separated.
    #[arg(long, env = "GLUSTER_SERVERS", value_delimiter = ',', required = true)]
    pub servers: Vec<String>,

    /// Directory under which volumes are mounted.
    #[arg(long, env = "GLUSTER_ROOT", default_value = DEFAULT_ROOT)]
    pub root: PathBuf,

    /// Brick base directory on the peers for volumes created by the plugin.
    #[arg(long, env = "GLUSTER_GFS_BASE")]
    pub gfs_base: Option<PathBuf>,

    /// GlusterFS REST endpoint, e.g. http://gfs-1:9000.
    #[arg(long, env = "GLUSTER_REST")]
    pub rest: Option<String>,

    /// Owner uid applied to mounted volumes (requires --gid).
    #[arg(long, env = "GLUSTER_UID")]
    pub uid: Option<u32>,

    /// Owner gid applied to mounted volumes (requires --uid).
    #[arg(long, env = "GLUSTER_GID")]
    pub gid: Option<u32>,

    /// Scope reported to the engine.
    #[arg(long, env = "GLUSTER_SCOPE")]
    pub scope: Option<Scope>,

    /// Plugin socket path.
    #[arg(long, env = "GLUSTER_PLUGIN_SOCKET", default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    #[arg(long, default_value = DEFAULT_GLUSTERFS_BIN)]
    pub glusterfs_bin: PathBuf,

    #[arg(long, default_value = DEFAULT_UMOUNT_BIN)]
    pub umount_bin: PathBuf,

    #[arg(long, default_value = DEFAULT_GLUSTER_BIN)]
    pub gluster_bin: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, env = "GLUSTER_LOG_JSON")]
    pub log_json: bool,
}

impl PluginArgs {
    pub fn ownership(&self) -> Result<Option<Ownership>> {
        match (self.uid, self.gid) {
            (Some(uid), Some(gid)) => Ok(Some(Ownership { uid, gid })),
            (None, None) => Ok(None),
            _ => bail!("--uid and --gid must be given together"),
        }
    }

    pub fn driver_config(&self) -> Result<DriverConfig> {
        let servers: Vec<String> = self
            .servers
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if servers.is_empty() {
            bail!("at least one GlusterFS server is required");
        }

        let mut config = DriverConfig::new(&self.root, servers);
        config.ownership = self.ownership()?;
        config.scope = self.scope;
        Ok(config)
    }

    fn mounter(&self) -> GlusterCli {
        GlusterCli::new()
            .with_glusterfs_bin(&self.glusterfs_bin)
            .with_umount_bin(&self.umount_bin)
            .with_gluster_bin(&self.gluster_bin)
    }

    /// The mount backend selected by the flags: REST-managed when an
    /// endpoint is given, the `glusterfs` CLI otherwise.
    pub fn backend(&self) -> Arc<dyn MountBackend> {
        match &self.rest {
            Some(endpoint) => {
                let base = self
                    .gfs_base
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BRICK_BASE));
                Arc::new(RestCluster::new(endpoint, base).with_mounter(self.mounter()))
            }
            None => {
                let mut cli = self.mounter();
                if let Some(base) = &self.gfs_base {
                    cli = cli.with_brick_base(base);
                }
                Arc::new(cli)
            }
        }
    }
}
