//! Mount backend managed through a GlusterFS REST endpoint.
//!
//! Attach and detach still go through the local FUSE client ([`GlusterCli`]);
//! only volume existence, creation and stop are delegated to the REST API:
//!
//! ```text
//! GET  <endpoint>/api/1.0/volumes
//! POST <endpoint>/api/1.0/volume/<name>        (form: bricks, replica, transport, start, force)
//! PUT  <endpoint>/api/1.0/volume/<name>/stop
//! ```
//!
//! Every reply carries `{"ok": bool, "err": string}`; the volume listing adds
//! a `data` array.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::cli::{GlusterCli, brick_list};
use super::{ClusterManager, MountBackend};
use crate::error::PluginError;
use crate::types::Scope;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    err: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiVolume {
    name: String,
}

/// REST-managed GlusterFS deployment.
pub struct RestCluster {
    endpoint: String,
    brick_base: PathBuf,
    client: reqwest::Client,
    mounter: GlusterCli,
}

impl RestCluster {
    /// `endpoint` is the base URL of the REST service, e.g.
    /// `http://gfs-1:9000`.  Bricks of created volumes live under
    /// `brick_base` on every peer.
    pub fn new(endpoint: impl Into<String>, brick_base: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            brick_base: brick_base.into(),
            client: reqwest::Client::new(),
            mounter: GlusterCli::new(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies, TLS roots).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Replace the local mount tooling used for attach/detach.
    pub fn with_mounter(mut self, mounter: GlusterCli) -> Self {
        self.mounter = mounter;
        self
    }

    /// Endpoint URL extended with `segments`, each percent-encoded as a
    /// single path segment.
    fn api_url(&self, segments: &[&str]) -> Result<reqwest::Url, PluginError> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            PluginError::InvalidArgument(format!("REST endpoint {}: {e}", self.endpoint))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                PluginError::InvalidArgument(format!(
                    "REST endpoint {} cannot carry a path",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, PluginError> {
        let status = response.status();
        let body = response.text().await.map_err(PluginError::cluster)?;
        if !status.is_success() {
            return Err(PluginError::Cluster(format!("{status}: {}", body.trim())));
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| PluginError::Cluster(format!("malformed reply: {e}")))?;
        if !parsed.ok {
            return Err(PluginError::Cluster(parsed.err));
        }
        Ok(parsed.data)
    }
}

#[async_trait]
impl MountBackend for RestCluster {
    fn scope(&self) -> Scope {
        Scope::Local
    }

    async fn attach(
        &self,
        servers: &[String],
        volume_id: &str,
        target: &Path,
    ) -> Result<(), PluginError> {
        self.mounter.attach(servers, volume_id, target).await
    }

    async fn detach(&self, target: &Path) -> Result<(), PluginError> {
        self.mounter.detach(target).await
    }

    fn cluster(&self) -> Option<&dyn ClusterManager> {
        Some(self)
    }
}

#[async_trait]
impl ClusterManager for RestCluster {
    async fn volume_exists(&self, name: &str) -> Result<bool, PluginError> {
        let url = self.api_url(&["api", "1.0", "volumes"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(PluginError::cluster)?;
        let volumes: Vec<ApiVolume> = Self::check(response).await?.unwrap_or_default();
        debug!(count = volumes.len(), "cluster volumes listed");
        Ok(volumes.iter().any(|v| v.name == name))
    }

    #[instrument(skip(self))]
    async fn create_volume(&self, name: &str, peers: &[String]) -> Result<(), PluginError> {
        if peers.is_empty() {
            return Err(PluginError::InvalidArgument(
                "at least one peer is required to create a volume".into(),
            ));
        }

        let bricks = brick_list(peers, &self.brick_base, name).join(",");
        let replica = peers.len().to_string();
        let params = [
            ("bricks", bricks.as_str()),
            ("replica", replica.as_str()),
            ("transport", "tcp"),
            ("start", "true"),
            ("force", "true"),
        ];

        let response = self
            .client
            .post(self.api_url(&["api", "1.0", "volume", name])?)
            .form(&params)
            .send()
            .await
            .map_err(PluginError::cluster)?;
        Self::check::<serde_json::Value>(response).await?;
        info!(name, replica = peers.len(), "cluster volume created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_volume(&self, name: &str) -> Result<(), PluginError> {
        let response = self
            .client
            .put(self.api_url(&["api", "1.0", "volume", name, "stop"])?)
            .send()
            .await
            .map_err(PluginError::cluster)?;
        Self::check::<serde_json::Value>(response).await?;
        info!(name, "cluster volume stopped");
        Ok(())
    }
}
