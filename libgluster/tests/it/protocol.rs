//! End-to-end plugin protocol exchanges over the Unix socket.

use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use libgluster::message::PluginResponse;
use libgluster::{Capability, Scope, Volume, VolumeDriver};

use crate::common::{Fixture, RecordingBackend, RunningServer};

#[tokio::test]
async fn activate_advertises_volume_driver() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);

    let resp = server.client.call("/Plugin.Activate", &json!({})).await.unwrap();
    assert_eq!(resp, PluginResponse::activate());

    server.shutdown().await;
}

#[tokio::test]
async fn full_volume_lifecycle_over_socket() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);
    let client = &server.client;
    let mountpoint = fx.mount_root().join("data").display().to_string();

    let resp = client
        .call("/VolumeDriver.Create", &json!({"Name": "data", "Opts": {}}))
        .await
        .unwrap();
    assert_eq!(resp, PluginResponse::ok());

    for id in ["c1", "c2"] {
        let resp = client
            .call("/VolumeDriver.Mount", &json!({"Name": "data", "ID": id}))
            .await
            .unwrap();
        assert_eq!(resp.mountpoint.as_deref(), Some(mountpoint.as_str()));
        assert!(!resp.is_error());
    }
    assert_eq!(fx.backend.attaches(), 1);

    let resp = client
        .call("/VolumeDriver.Get", &json!({"Name": "data"}))
        .await
        .unwrap();
    assert_eq!(resp.volume, Some(Volume::new("data", &mountpoint)));

    let resp = client.call("/VolumeDriver.List", &json!({})).await.unwrap();
    assert_eq!(resp.volumes.map(|v| v.len()), Some(1));

    let resp = client
        .call("/VolumeDriver.Path", &json!({"Name": "data"}))
        .await
        .unwrap();
    assert_eq!(resp.mountpoint.as_deref(), Some(mountpoint.as_str()));

    for id in ["c1", "c2"] {
        let resp = client
            .call("/VolumeDriver.Unmount", &json!({"Name": "data", "ID": id}))
            .await
            .unwrap();
        assert_eq!(resp, PluginResponse::ok());
    }
    assert_eq!(fx.backend.detaches(), 1);

    let resp = client
        .call("/VolumeDriver.Remove", &json!({"Name": "data"}))
        .await
        .unwrap();
    assert_eq!(resp, PluginResponse::ok());

    server.shutdown().await;
}

#[tokio::test]
async fn errors_are_reported_in_err_field() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);

    let resp = server
        .client
        .call("/VolumeDriver.Unmount", &json!({"Name": "ghost", "ID": "c1"}))
        .await
        .unwrap();
    assert_eq!(
        resp.err,
        format!(
            "unable to find volume mounted on {}",
            fx.mount_root().join("ghost").display()
        )
    );
    assert!(resp.mountpoint.is_none());

    let resp = server
        .client
        .call("/VolumeDriver.Get", &json!({"Name": "ghost"}))
        .await
        .unwrap();
    assert!(resp.is_error());
    assert!(resp.volume.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn capabilities_report_scope() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);

    let resp = server
        .client
        .call("/VolumeDriver.Capabilities", &json!({}))
        .await
        .unwrap();
    assert_eq!(
        resp.capabilities,
        Some(Capability {
            scope: Scope::Global
        })
    );

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_endpoint_and_bad_json() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);

    let resp = server
        .client
        .call("/NetworkDriver.CreateNetwork", &json!({}))
        .await
        .unwrap();
    assert!(resp.err.contains("unknown endpoint"), "{}", resp.err);

    let resp = server
        .client
        .call("/VolumeDriver.Mount", &json!({"Name": 42}))
        .await
        .unwrap();
    assert!(resp.err.starts_with("invalid argument: malformed request"), "{}", resp.err);
    assert_eq!(fx.backend.attaches(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn socket_is_removed_on_shutdown() {
    let fx = Fixture::new();
    let server = RunningServer::start(&fx);
    let socket = server.client.socket_path().to_path_buf();
    assert!(socket.exists());

    server.shutdown().await;
    assert!(!socket.exists());
}

#[tokio::test]
async fn dropped_connection_does_not_cancel_mount() {
    let fx = Fixture::with_backend(RecordingBackend {
        attach_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let server = RunningServer::start(&fx);

    let body = r#"{"Name":"data","ID":"c1"}"#;
    let request = format!(
        "POST /VolumeDriver.Mount HTTP/1.1\r\nHost: plugin\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut stream = UnixStream::connect(server.client.socket_path()).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);

    // Queues behind the in-flight attach on the registry lock.
    fx.driver.mount("data", "c2").await.unwrap();
    assert_eq!(fx.backend.attaches(), 1);
    assert_eq!(fx.driver.reference_count("data").await, Some(2));

    server.shutdown().await;
}
