//! Volume lifecycle controller.
//!
//! [`GlusterDriver`] implements the [`VolumeDriver`] vocabulary on top of the
//! [`VolumeRegistry`] and a [`MountBackend`].  Each operation holds the
//! registry lock for its whole body, external attach/detach included, so
//! volume operations are serialized process-wide and the remote filesystem
//! is attached exactly on the `0 → 1` reference-count transition and
//! detached exactly on `1 → 0`.
//!
//! ```text
//!            Mount                Mount / Unmount            Unmount
//!  unknown ─────────▶ mounted(1) ◀───────────────▶ mounted(n) ...
//!                        │ Unmount (detach)
//!                        ▼
//!                   unmounted(0) ──Remove──▶ unknown
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::backend::MountBackend;
use crate::error::PluginError;
use crate::registry::VolumeRegistry;
use crate::types::{Capability, Ownership, Scope, Volume, VolumeRecord};

/// Mode of mount directories created by the driver.
const MOUNT_DIR_MODE: u32 = 0o755;

/// The request vocabulary of a Docker volume plugin.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Declare a volume.  Nothing is mounted yet.
    async fn create(
        &self,
        name: &str,
        opts: &HashMap<String, String>,
    ) -> Result<(), PluginError>;

    /// Forget a volume.  Removing an unknown volume succeeds.
    async fn remove(&self, name: &str) -> Result<(), PluginError>;

    /// Make the volume available and return its mountpoint.
    async fn mount(&self, name: &str, id: &str) -> Result<PathBuf, PluginError>;

    /// Release one mount taken by [`VolumeDriver::mount`].
    async fn unmount(&self, name: &str, id: &str) -> Result<(), PluginError>;

    /// Mountpoint of `name`, whether or not it is mounted.
    fn path(&self, name: &str) -> Result<PathBuf, PluginError>;

    async fn get(&self, name: &str) -> Result<Volume, PluginError>;

    async fn list(&self) -> Result<Vec<Volume>, PluginError>;

    fn capabilities(&self) -> Capability;
}

/// Process-wide settings for [`GlusterDriver`].
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory under which every volume gets its mountpoint.
    pub mount_root: PathBuf,
    /// GlusterFS servers handed to the mount tool and used as peers when a
    /// volume has to be created on the cluster.
    pub servers: Vec<String>,
    /// Owner applied to freshly attached mountpoints.
    pub ownership: Option<Ownership>,
    /// Overrides the backend's scope in `Capabilities`.
    pub scope: Option<Scope>,
}

impl DriverConfig {
    pub fn new(mount_root: impl Into<PathBuf>, servers: Vec<String>) -> Self {
        Self {
            mount_root: mount_root.into(),
            servers,
            ownership: None,
            scope: None,
        }
    }
}

/// Reference-counted GlusterFS volume driver.
pub struct GlusterDriver {
    config: DriverConfig,
    registry: VolumeRegistry,
    backend: Arc<dyn MountBackend>,
}

impl GlusterDriver {
    pub fn new(config: DriverConfig, backend: Arc<dyn MountBackend>) -> Self {
        Self {
            config,
            registry: VolumeRegistry::new(),
            backend,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Current reference count of `name`, `None` when untracked.
    pub async fn reference_count(&self, name: &str) -> Option<u32> {
        self.registry
            .lock()
            .await
            .get(name)
            .map(|rec| rec.reference_count)
    }

    /// Detach every volume that is still attached and forget it.
    ///
    /// Called once when the plugin shuts down.  Failures are logged and the
    /// remaining volumes are still processed.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        for rec in registry.attached() {
            let mount = self.config.mount_root.join(&rec.name);
            match self.backend.detach(&mount).await {
                Ok(()) => {
                    registry.remove(&rec.name);
                    info!(name = %rec.name, path = %mount.display(), "volume detached on shutdown");
                }
                Err(e) => {
                    warn!(name = %rec.name, error = %e, "failed to detach volume on shutdown");
                }
            }
        }
    }

    /// Join `name` onto the mount root.  Names are restricted to the
    /// GlusterFS volume charset: `[A-Za-z0-9_-]` with no leading `-`.
    fn mountpoint(&self, name: &str) -> Result<PathBuf, PluginError> {
        let valid = !name.is_empty()
            && !name.starts_with('-')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PluginError::InvalidArgument(format!(
                "invalid volume name {name:?}"
            )));
        }
        Ok(self.config.mount_root.join(name))
    }

    fn apply_ownership(&self, mount: &Path) {
        let Some(owner) = self.config.ownership else {
            return;
        };
        let uid = nix::unistd::Uid::from_raw(owner.uid);
        let gid = nix::unistd::Gid::from_raw(owner.gid);
        if let Err(e) = nix::unistd::chown(mount, Some(uid), Some(gid)) {
            // Ownership is cosmetic; the mount itself succeeded.
            warn!(
                path = %mount.display(),
                uid = owner.uid,
                gid = owner.gid,
                error = %e,
                "failed to change mountpoint ownership",
            );
        }
    }
}

/// Make sure `mount` is a directory, creating it (and its parents) if
/// missing.
async fn ensure_directory(mount: &Path) -> Result<(), PluginError> {
    match tokio::fs::symlink_metadata(mount).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PluginError::NotADirectory {
            path: mount.display().to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::DirBuilder::new()
                .recursive(true)
                .mode(MOUNT_DIR_MODE)
                .create(mount)
                .await
                .map_err(|e| PluginError::io(mount, e))?;
            debug!(path = %mount.display(), "mount directory created");
            Ok(())
        }
        Err(e) => Err(PluginError::io(mount, e)),
    }
}

/// Fail when something other than a directory sits at `mount`.
async fn check_no_conflict(mount: &Path) -> Result<(), PluginError> {
    match tokio::fs::symlink_metadata(mount).await {
        Ok(meta) if !meta.is_dir() => Err(PluginError::NotADirectory {
            path: mount.display().to_string(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PluginError::io(mount, e)),
    }
}

/// Remove the mountpoint left behind by a detached volume.  Only an empty
/// directory is removed; anything else is left alone.
async fn remove_mount_dir(mount: &Path) {
    match tokio::fs::remove_dir(mount).await {
        Ok(()) => debug!(path = %mount.display(), "mount directory removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!(path = %mount.display(), error = %e, "mount directory kept"),
    }
}

#[async_trait]
impl VolumeDriver for GlusterDriver {
    #[instrument(skip(self, opts))]
    async fn create(
        &self,
        name: &str,
        opts: &HashMap<String, String>,
    ) -> Result<(), PluginError> {
        let mount = self.mountpoint(name)?;
        let registry = self.registry.lock().await;
        info!(path = %mount.display(), "creating volume");

        if !opts.is_empty() {
            debug!(?opts, "ignoring volume options");
        }

        if registry.get(name).is_some() {
            debug!("volume already tracked");
            return Ok(());
        }

        check_no_conflict(&mount).await?;

        if let Some(cluster) = self.backend.cluster() {
            if cluster.volume_exists(name).await? {
                debug!("volume already present on the cluster");
            } else {
                cluster.create_volume(name, &self.config.servers).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<(), PluginError> {
        let mount = self.mountpoint(name)?;
        let mut registry = self.registry.lock().await;
        info!(path = %mount.display(), "removing volume");

        let Some(rec) = registry.get(name) else {
            debug!("volume not tracked, nothing to remove");
            return Ok(());
        };

        match rec.reference_count {
            0 => {}
            1 => {
                self.backend.detach(&mount).await?;
                registry.decrement(name);
            }
            count => {
                return Err(PluginError::VolumeInUse {
                    name: name.to_owned(),
                    count,
                });
            }
        }

        if let Some(cluster) = self.backend.cluster() {
            cluster.stop_volume(name).await?;
        }

        registry.remove(name);
        remove_mount_dir(&mount).await;
        info!("volume removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mount(&self, name: &str, id: &str) -> Result<PathBuf, PluginError> {
        let mount = self.mountpoint(name)?;
        let mut registry = self.registry.lock().await;
        info!(path = %mount.display(), "mounting volume");

        if registry.get(name).is_some_and(|rec| rec.is_attached()) {
            let rec = registry.upsert_increment(name);
            debug!(count = rec.reference_count, "volume already attached");
            return Ok(mount);
        }

        ensure_directory(&mount).await?;
        self.backend
            .attach(&self.config.servers, name, &mount)
            .await?;
        let rec = registry.upsert_increment(name);
        self.apply_ownership(&mount);

        info!(count = rec.reference_count, "volume attached");
        Ok(mount)
    }

    #[instrument(skip(self))]
    async fn unmount(&self, name: &str, id: &str) -> Result<(), PluginError> {
        let mount = self.mountpoint(name)?;
        let mut registry = self.registry.lock().await;
        info!(path = %mount.display(), "unmounting volume");

        let Some(rec) = registry.get(name).filter(VolumeRecord::is_attached) else {
            return Err(PluginError::not_found(&mount));
        };

        if rec.reference_count == 1 {
            self.backend.detach(&mount).await?;
        }

        let rec = registry
            .decrement(name)
            .ok_or_else(|| PluginError::not_found(&mount))?;
        debug!(count = rec.reference_count, "volume released");
        Ok(())
    }

    fn path(&self, name: &str) -> Result<PathBuf, PluginError> {
        self.mountpoint(name)
    }

    async fn get(&self, name: &str) -> Result<Volume, PluginError> {
        let mount = self.mountpoint(name)?;
        let registry = self.registry.lock().await;
        registry
            .get(name)
            .map(|rec| Volume::new(rec.name, &mount))
            .ok_or_else(|| PluginError::not_found(&mount))
    }

    async fn list(&self) -> Result<Vec<Volume>, PluginError> {
        let registry = self.registry.lock().await;
        let mut volumes: Vec<Volume> = registry
            .list()
            .into_iter()
            .map(|rec| {
                let mount = self.config.mount_root.join(&rec.name);
                Volume::new(rec.name, mount)
            })
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }

    fn capabilities(&self) -> Capability {
        Capability {
            scope: self.config.scope.unwrap_or_else(|| self.backend.scope()),
        }
    }
}
