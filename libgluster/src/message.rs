//! Docker volume plugin protocol messages.
//!
//! The engine POSTs a JSON body to `/<Endpoint>` on the plugin socket and
//! reads back a JSON object.  [`PluginRequest`] is the decoded request;
//! [`PluginResponse`] is the reply envelope, of which at most one payload
//! field is ever populated.  Field names follow the Docker plugin API.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::types::{Capability, Volume};

/// Content type of every plugin reply.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Subsystem advertised during activation.
pub const VOLUME_DRIVER: &str = "VolumeDriver";

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub name: String,
    /// `-o key=value` options; the engine sends `null` when there are none.
    #[serde(default)]
    pub opts: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    #[serde(default)]
    pub name: String,
    /// Caller (container) identifier.
    #[serde(rename = "ID", default)]
    pub id: String,
}

/// A decoded plugin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginRequest {
    Activate,
    Create(CreateRequest),
    Remove(NameRequest),
    Mount(MountRequest),
    Unmount(MountRequest),
    Path(NameRequest),
    Get(NameRequest),
    List,
    Capabilities,
}

impl PluginRequest {
    /// Decode the request for `endpoint` (the URL path, leading slash
    /// included).  Returns `Ok(None)` for endpoints this plugin does not
    /// serve.  An empty body is treated as `{}`.
    pub fn parse(endpoint: &str, body: &[u8]) -> Result<Option<Self>, PluginError> {
        let body = if body.iter().all(u8::is_ascii_whitespace) {
            b"{}".as_slice()
        } else {
            body
        };
        let request = match endpoint {
            "/Plugin.Activate" => Self::Activate,
            "/VolumeDriver.Create" => Self::Create(decode(body)?),
            "/VolumeDriver.Remove" => Self::Remove(decode(body)?),
            "/VolumeDriver.Mount" => Self::Mount(decode(body)?),
            "/VolumeDriver.Unmount" => Self::Unmount(decode(body)?),
            "/VolumeDriver.Path" => Self::Path(decode(body)?),
            "/VolumeDriver.Get" => Self::Get(decode(body)?),
            "/VolumeDriver.List" => Self::List,
            "/VolumeDriver.Capabilities" => Self::Capabilities,
            _ => return Ok(None),
        };
        Ok(Some(request))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, PluginError> {
    serde_json::from_slice(body)
        .map_err(|e| PluginError::InvalidArgument(format!("malformed request: {e}")))
}

impl fmt::Display for PluginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activate => f.write_str("Activate"),
            Self::Create(req) => write!(f, "Create({})", req.name),
            Self::Remove(req) => write!(f, "Remove({})", req.name),
            Self::Mount(req) => write!(f, "Mount({}, id={})", req.name, req.id),
            Self::Unmount(req) => write!(f, "Unmount({}, id={})", req.name, req.id),
            Self::Path(req) => write!(f, "Path({})", req.name),
            Self::Get(req) => write!(f, "Get({})", req.name),
            Self::List => f.write_str("List"),
            Self::Capabilities => f.write_str("Capabilities"),
        }
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Reply to any plugin request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PluginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capability>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl PluginResponse {
    /// Successful reply without payload.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn activate() -> Self {
        Self {
            implements: Some(vec![VOLUME_DRIVER.to_owned()]),
            ..Self::default()
        }
    }

    pub fn mountpoint(path: &Path) -> Self {
        Self {
            mountpoint: Some(path.display().to_string()),
            ..Self::default()
        }
    }

    pub fn volume(volume: Volume) -> Self {
        Self {
            volume: Some(volume),
            ..Self::default()
        }
    }

    pub fn volumes(volumes: Vec<Volume>) -> Self {
        Self {
            volumes: Some(volumes),
            ..Self::default()
        }
    }

    pub fn capabilities(capabilities: Capability) -> Self {
        Self {
            capabilities: Some(capabilities),
            ..Self::default()
        }
    }

    pub fn error(err: &PluginError) -> Self {
        Self {
            err: err.to_string(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.err.is_empty()
    }
}

impl From<Result<PluginResponse, PluginError>> for PluginResponse {
    fn from(result: Result<PluginResponse, PluginError>) -> Self {
        result.unwrap_or_else(|e| Self::error(&e))
    }
}

impl fmt::Display for PluginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error() {
            write!(f, "Error({})", self.err)
        } else if let Some(path) = &self.mountpoint {
            write!(f, "Mountpoint({path})")
        } else if let Some(vol) = &self.volume {
            write!(f, "Volume({})", vol.name)
        } else if let Some(vols) = &self.volumes {
            write!(f, "Volumes(count={})", vols.len())
        } else if let Some(cap) = &self.capabilities {
            write!(f, "Capabilities({})", cap.scope)
        } else if self.implements.is_some() {
            f.write_str("Activated")
        } else {
            f.write_str("Ok")
        }
    }
}
