//! Unix-socket HTTP server that receives plugin requests from the Docker
//! engine and dispatches them to a [`VolumeDriver`].

use std::convert::Infallible;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::accept;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::net::{UnixListener, UnixStream};
use tokio_stream::wrappers::UnixListenerStream;
use tracing::{debug, info, instrument, warn};

use crate::driver::VolumeDriver;
use crate::error::PluginError;
use crate::message::{self, PluginRequest, PluginResponse};

/// Plugin endpoint bound to a Unix socket.
pub struct PluginServer<T> {
    listener: UnixListener,
    socket_path: PathBuf,
    driver: Arc<T>,
}

impl<T> PluginServer<T>
where
    T: VolumeDriver + 'static,
{
    /// Bind `socket_path`, replacing a stale socket left by a previous run
    /// and creating the parent directory if needed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(socket_path: impl Into<PathBuf>, driver: Arc<T>) -> Result<Self, PluginError> {
        let socket_path = socket_path.into();
        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale plugin socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PluginError::io(&socket_path, e)),
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PluginError::io(parent, e))?;
        }

        let listener =
            UnixListener::bind(&socket_path).map_err(|e| PluginError::io(&socket_path, e))?;
        info!(path = %socket_path.display(), "plugin socket listening");
        Ok(Self {
            listener,
            socket_path,
            driver,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until the listener fails.
    pub async fn serve(self) -> Result<(), PluginError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then finish in-flight requests and
    /// remove the socket file.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), PluginError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            socket_path,
            driver,
        } = self;

        let incoming = accept::from_stream(UnixListenerStream::new(listener));
        let make = make_service_fn(move |_conn: &UnixStream| {
            let driver = Arc::clone(&driver);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    Self::handle(Arc::clone(&driver), req)
                }))
            }
        });

        let result = Server::builder(incoming)
            .serve(make)
            .with_graceful_shutdown(signal)
            .await
            .map_err(PluginError::transport);

        if let Err(e) = std::fs::remove_file(&socket_path) {
            debug!(path = %socket_path.display(), error = %e, "plugin socket not removed");
        }
        info!(path = %socket_path.display(), "plugin socket closed");
        result
    }

    /// Process one HTTP request: decode → dispatch → encode.
    #[instrument(skip_all, fields(endpoint = %req.uri().path()))]
    async fn handle(driver: Arc<T>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        if req.method() != Method::POST {
            let err = PluginError::InvalidArgument(format!("method {} not allowed", req.method()));
            return Ok(reply(StatusCode::METHOD_NOT_ALLOWED, &PluginResponse::error(&err)));
        }

        let endpoint = req.uri().path().to_owned();
        let body = match hyper::body::to_bytes(req.into_body()).await {
            Ok(body) => body,
            Err(e) => {
                let err = PluginError::transport(e);
                return Ok(reply(StatusCode::BAD_REQUEST, &PluginResponse::error(&err)));
            }
        };

        let request = match PluginRequest::parse(&endpoint, &body) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!("unknown plugin endpoint");
                let err = PluginError::InvalidArgument(format!("unknown endpoint {endpoint}"));
                return Ok(reply(StatusCode::NOT_FOUND, &PluginResponse::error(&err)));
            }
            Err(e) => {
                warn!(error = %e, "malformed plugin request");
                return Ok(reply(StatusCode::BAD_REQUEST, &PluginResponse::error(&e)));
            }
        };

        debug!(%request, "plugin request received");
        // Driver calls run to completion even if the engine hangs up.
        let operation = tokio::spawn(async move { Self::dispatch(&driver, request).await });
        let response = match operation.await {
            Ok(response) => response,
            Err(e) => PluginResponse::error(&PluginError::internal(e)),
        };

        let status = if response.is_error() {
            warn!(%response, "plugin request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            debug!(%response, "plugin request served");
            StatusCode::OK
        };
        Ok(reply(status, &response))
    }

    /// Map a [`PluginRequest`] to the matching driver call and wrap the
    /// outcome in a [`PluginResponse`].
    pub async fn dispatch(driver: &T, request: PluginRequest) -> PluginResponse {
        match request {
            PluginRequest::Activate => PluginResponse::activate(),
            PluginRequest::Create(req) => driver
                .create(&req.name, &req.opts.unwrap_or_default())
                .await
                .map(|()| PluginResponse::ok())
                .into(),
            PluginRequest::Remove(req) => driver
                .remove(&req.name)
                .await
                .map(|()| PluginResponse::ok())
                .into(),
            PluginRequest::Mount(req) => driver
                .mount(&req.name, &req.id)
                .await
                .map(|path| PluginResponse::mountpoint(&path))
                .into(),
            PluginRequest::Unmount(req) => driver
                .unmount(&req.name, &req.id)
                .await
                .map(|()| PluginResponse::ok())
                .into(),
            PluginRequest::Path(req) => driver
                .path(&req.name)
                .map(|path| PluginResponse::mountpoint(&path))
                .into(),
            PluginRequest::Get(req) => driver
                .get(&req.name)
                .await
                .map(PluginResponse::volume)
                .into(),
            PluginRequest::List => driver.list().await.map(PluginResponse::volumes).into(),
            PluginRequest::Capabilities => PluginResponse::capabilities(driver.capabilities()),
        }
    }
}

fn reply(status: StatusCode, response: &PluginResponse) -> Response<Body> {
    let (status, payload) = match serde_json::to_vec(response) {
        Ok(payload) => (status, payload),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(r#"{{"Err":"encode response: {e}"}}"#).into_bytes(),
        ),
    };
    let mut resp = Response::new(Body::from(payload));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(message::CONTENT_TYPE));
    resp
}
