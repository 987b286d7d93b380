//! Plugin error types.
//!
//! Every failure the driver can report is a [`PluginError`].  The Docker
//! engine only ever sees the rendered message (the `Err` field of a plugin
//! response), so the [`std::fmt::Display`] output of each variant is part of
//! the protocol contract.  The enum is also [`Serialize`]/[`Deserialize`] so
//! tests and tooling can carry structured errors around.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for volume plugin operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No active record exists for the requested volume.
    #[error("unable to find volume mounted on {path}")]
    VolumeNotFound {
        /// Mountpoint the caller asked about.
        path: String,
    },

    /// The mountpoint is occupied by something that is not a directory.
    #[error("{path} already exists and is not a directory")]
    NotADirectory {
        /// Conflicting filesystem path.
        path: String,
    },

    /// The volume still has more than one outstanding mount.
    #[error("volume {name} is in use ({count} active mounts)")]
    VolumeInUse {
        /// Volume name.
        name: String,
        /// Current reference count.
        count: u32,
    },

    /// A filesystem syscall on the mount root failed.
    #[error("{path}: {reason}")]
    Io {
        /// Path the syscall targeted.
        path: String,
        /// Underlying OS error message.
        reason: String,
    },

    /// The external mount tool failed to attach the volume.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Mountpoint where the attach was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The external unmount tool failed to detach the volume.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Mountpoint where the detach was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The GlusterFS cluster (CLI or REST endpoint) reported an error.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Socket / HTTP level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PluginError {
    /// Build a [`PluginError::VolumeNotFound`] for a mountpoint.
    pub fn not_found(path: &Path) -> Self {
        Self::VolumeNotFound {
            path: path.display().to_string(),
        }
    }

    /// Build a [`PluginError::Io`] from a path and an [`std::io::Error`].
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Create a [`PluginError::Cluster`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn cluster<E: std::fmt::Display>(e: E) -> Self {
        Self::Cluster(e.to_string())
    }

    /// Create a [`PluginError::Transport`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    /// Create a [`PluginError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}
