//! Shared fixtures: a call-recording mount backend and a running plugin
//! server on a scratch socket.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use libgluster::transport::client::PluginClient;
use libgluster::transport::server::PluginServer;
use libgluster::{
    ClusterManager, DriverConfig, GlusterDriver, MountBackend, PluginError, Scope,
};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Mount backend that counts attach/detach calls and optionally pretends to
/// manage a cluster.
#[derive(Default)]
pub struct RecordingBackend {
    pub attaches: AtomicUsize,
    pub detaches: AtomicUsize,
    pub cluster_calls: Mutex<Vec<String>>,
    pub manage_cluster: bool,
    /// Slows attach down so concurrent mounts overlap.
    pub attach_delay: Option<Duration>,
}

impl RecordingBackend {
    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn cluster_calls(&self) -> Vec<String> {
        self.cluster_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MountBackend for RecordingBackend {
    fn scope(&self) -> Scope {
        Scope::Global
    }

    async fn attach(
        &self,
        _servers: &[String],
        _volume_id: &str,
        _target: &Path,
    ) -> Result<(), PluginError> {
        if let Some(delay) = self.attach_delay {
            tokio::time::sleep(delay).await;
        }
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detach(&self, _target: &Path) -> Result<(), PluginError> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cluster(&self) -> Option<&dyn ClusterManager> {
        self.manage_cluster.then_some(self as &dyn ClusterManager)
    }
}

#[async_trait]
impl ClusterManager for RecordingBackend {
    async fn volume_exists(&self, name: &str) -> Result<bool, PluginError> {
        self.cluster_calls
            .lock()
            .unwrap()
            .push(format!("exists {name}"));
        Ok(name == "existing")
    }

    async fn create_volume(&self, name: &str, peers: &[String]) -> Result<(), PluginError> {
        self.cluster_calls
            .lock()
            .unwrap()
            .push(format!("create {name} {}", peers.join(",")));
        Ok(())
    }

    async fn stop_volume(&self, name: &str) -> Result<(), PluginError> {
        self.cluster_calls
            .lock()
            .unwrap()
            .push(format!("stop {name}"));
        Ok(())
    }
}

/// Driver rooted in a fresh temporary directory.
pub struct Fixture {
    pub tmp: TempDir,
    pub backend: Arc<RecordingBackend>,
    pub driver: Arc<GlusterDriver>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_backend(RecordingBackend::default())
    }

    pub fn with_backend(backend: RecordingBackend) -> Self {
        init_logger();
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let config = DriverConfig::new(
            tmp.path().join("volumes"),
            vec!["gfs-1".into(), "gfs-2".into()],
        );
        let driver = Arc::new(GlusterDriver::new(
            config,
            Arc::clone(&backend) as Arc<dyn MountBackend>,
        ));
        Self {
            tmp,
            backend,
            driver,
        }
    }

    pub fn mount_root(&self) -> PathBuf {
        self.tmp.path().join("volumes")
    }
}

/// A plugin server running on a socket inside the fixture directory.
pub struct RunningServer {
    pub client: PluginClient,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), PluginError>>,
}

impl RunningServer {
    pub fn start(fixture: &Fixture) -> Self {
        let socket = fixture.tmp.path().join("run/glusterfs.sock");
        let server = PluginServer::bind(&socket, Arc::clone(&fixture.driver)).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = stopped.await;
        }));
        Self {
            client: PluginClient::new(socket),
            stop: Some(stop),
            handle,
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}
