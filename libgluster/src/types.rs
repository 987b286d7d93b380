//! Core data model: lifecycle records, volume descriptors, scope, ownership.
//!
//! The descriptor types cross the plugin socket as JSON, so their serde
//! field names follow the Docker plugin API (`Name`, `Mountpoint`, `Scope`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lifecycle record
// ---------------------------------------------------------------------------

/// Lifecycle record held by the [`crate::registry::VolumeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Volume name as supplied by the engine.
    pub name: String,
    /// Number of outstanding mount requests.
    pub reference_count: u32,
}

impl VolumeRecord {
    /// Whether the remote filesystem is currently attached for this record.
    pub fn is_attached(&self) -> bool {
        self.reference_count > 0
    }
}

// ---------------------------------------------------------------------------
// Volume descriptor
// ---------------------------------------------------------------------------

/// Volume as reported back to the engine by `Get` and `List`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Local path where the volume is (or will be) available.
    pub mountpoint: String,
}

impl Volume {
    pub fn new(name: impl Into<String>, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mountpoint: mountpoint.into().display().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Visibility of the volumes served by this plugin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes are only meaningful on this host.
    Local,
    /// Volumes are backed by storage shared across hosts.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Global => f.write_str("global"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown scope {other:?}, expected local or global")),
        }
    }
}

/// Capabilities advertised through `VolumeDriver.Capabilities`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub scope: Scope,
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// Owner applied to a mount directory right after the volume is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}
