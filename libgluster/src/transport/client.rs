//! Minimal plugin client: one HTTP/1.1 connection per request over the
//! plugin's Unix socket.

use std::path::{Path, PathBuf};

use hyper::header::HOST;
use hyper::{Body, Request};
use serde::Serialize;
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use crate::error::PluginError;
use crate::message::PluginResponse;

/// Sends plugin requests the way the Docker engine does.
#[derive(Debug, Clone)]
pub struct PluginClient {
    socket_path: PathBuf,
}

impl PluginClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// POST `body` as JSON to `endpoint` (e.g. `/VolumeDriver.Mount`) and
    /// decode the reply.  Error replies are returned as a
    /// [`PluginResponse`] with `err` set, not as `Err`.
    #[instrument(skip(self, body))]
    pub async fn call<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<PluginResponse, PluginError> {
        let payload = serde_json::to_vec(body).map_err(PluginError::internal)?;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| PluginError::io(&self.socket_path, e))?;
        let (mut sender, connection) = hyper::client::conn::handshake(stream)
            .await
            .map_err(PluginError::transport)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "plugin client connection closed with error");
            }
        });

        let request = Request::post(endpoint)
            .header(HOST, "plugin")
            .body(Body::from(payload))
            .map_err(PluginError::transport)?;
        let response = sender
            .send_request(request)
            .await
            .map_err(PluginError::transport)?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(PluginError::transport)?;
        let decoded: PluginResponse = serde_json::from_slice(&bytes).map_err(|e| {
            PluginError::Transport(format!("malformed reply ({status}): {e}"))
        })?;
        debug!(%status, response = %decoded, "plugin reply received");
        Ok(decoded)
    }
}
