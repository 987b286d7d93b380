//! Reference-counting behaviour of the lifecycle controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use libgluster::{PluginError, Volume, VolumeDriver};

use crate::common::{Fixture, RecordingBackend};

#[tokio::test]
async fn mount_twice_then_unmount_twice() {
    let fx = Fixture::new();
    let expected = fx.mount_root().join("data");

    let first = fx.driver.mount("data", "c1").await.unwrap();
    assert_eq!(first, expected);
    assert!(expected.is_dir());
    assert_eq!(fx.backend.attaches(), 1);
    assert_eq!(fx.driver.reference_count("data").await, Some(1));

    let second = fx.driver.mount("data", "c2").await.unwrap();
    assert_eq!(second, expected);
    assert_eq!(fx.backend.attaches(), 1);
    assert_eq!(fx.driver.reference_count("data").await, Some(2));

    fx.driver.unmount("data", "c1").await.unwrap();
    assert_eq!(fx.driver.reference_count("data").await, Some(1));
    assert_eq!(fx.backend.detaches(), 0);

    fx.driver.unmount("data", "c2").await.unwrap();
    assert_eq!(fx.driver.reference_count("data").await, Some(0));
    assert_eq!(fx.backend.detaches(), 1);
}

#[tokio::test]
async fn many_mounts_attach_once() {
    let fx = Fixture::new();
    for i in 0..10 {
        fx.driver.mount("data", &format!("c{i}")).await.unwrap();
    }
    assert_eq!(fx.backend.attaches(), 1);
    assert_eq!(fx.driver.reference_count("data").await, Some(10));

    for i in 0..10 {
        fx.driver.unmount("data", &format!("c{i}")).await.unwrap();
    }
    assert_eq!(fx.backend.detaches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mounts_attach_once() {
    let fx = Fixture::with_backend(RecordingBackend {
        attach_delay: Some(Duration::from_millis(20)),
        ..Default::default()
    });

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let driver = Arc::clone(&fx.driver);
            tokio::spawn(async move { driver.mount("shared", &format!("c{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fx.backend.attaches(), 1);
    assert_eq!(fx.driver.reference_count("shared").await, Some(8));
}

#[tokio::test]
async fn remount_after_full_release_attaches_again() {
    let fx = Fixture::new();
    fx.driver.mount("data", "c1").await.unwrap();
    fx.driver.unmount("data", "c1").await.unwrap();
    fx.driver.mount("data", "c2").await.unwrap();

    assert_eq!(fx.backend.attaches(), 2);
    assert_eq!(fx.backend.detaches(), 1);
    assert_eq!(fx.driver.reference_count("data").await, Some(1));
}

#[tokio::test]
async fn unmount_never_mounted_is_not_found() {
    let fx = Fixture::new();
    let err = fx.driver.unmount("ghost", "c1").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "unable to find volume mounted on {}",
            fx.mount_root().join("ghost").display()
        )
    );
    assert_eq!(fx.backend.detaches(), 0);
}

#[tokio::test]
async fn create_then_mount_uses_mount_root() {
    let fx = Fixture::new();
    fx.driver.create("data", &HashMap::new()).await.unwrap();
    let path = fx.driver.mount("data", "c1").await.unwrap();
    assert_eq!(path, fx.mount_root().join("data"));
}

#[tokio::test]
async fn create_provisions_missing_cluster_volume() {
    let fx = Fixture::with_backend(RecordingBackend {
        manage_cluster: true,
        ..Default::default()
    });

    fx.driver.create("fresh", &HashMap::new()).await.unwrap();
    fx.driver.create("existing", &HashMap::new()).await.unwrap();

    assert_eq!(
        fx.backend.cluster_calls(),
        [
            "exists fresh",
            "create fresh gfs-1,gfs-2",
            "exists existing"
        ]
    );
}

#[tokio::test]
async fn create_of_tracked_volume_skips_cluster() {
    let fx = Fixture::with_backend(RecordingBackend {
        manage_cluster: true,
        ..Default::default()
    });

    fx.driver.mount("data", "c1").await.unwrap();
    fx.driver.create("data", &HashMap::new()).await.unwrap();
    assert!(fx.backend.cluster_calls().is_empty());
}

#[tokio::test]
async fn remove_stops_cluster_volume_and_is_idempotent() {
    let fx = Fixture::with_backend(RecordingBackend {
        manage_cluster: true,
        ..Default::default()
    });

    fx.driver.mount("data", "c1").await.unwrap();
    fx.driver.unmount("data", "c1").await.unwrap();

    fx.driver.remove("data").await.unwrap();
    fx.driver.remove("data").await.unwrap();

    assert_eq!(fx.backend.cluster_calls(), ["stop data"]);
    assert_eq!(fx.driver.reference_count("data").await, None);
    assert!(matches!(
        fx.driver.get("data").await,
        Err(PluginError::VolumeNotFound { .. })
    ));
}

#[tokio::test]
async fn list_reports_each_volume_once() {
    let fx = Fixture::new();
    fx.driver.mount("b", "c1").await.unwrap();
    fx.driver.mount("a", "c1").await.unwrap();
    fx.driver.mount("b", "c2").await.unwrap();

    let volumes = fx.driver.list().await.unwrap();
    assert_eq!(
        volumes,
        [
            Volume::new("a", fx.mount_root().join("a")),
            Volume::new("b", fx.mount_root().join("b")),
        ]
    );
}

#[tokio::test]
async fn shutdown_releases_attached_volumes() {
    let fx = Fixture::new();
    fx.driver.mount("a", "c1").await.unwrap();
    fx.driver.mount("a", "c2").await.unwrap();
    fx.driver.mount("b", "c1").await.unwrap();

    fx.driver.shutdown().await;

    assert_eq!(fx.backend.detaches(), 2);
    assert!(fx.driver.list().await.unwrap().is_empty());
}
