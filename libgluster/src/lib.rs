//! # libgluster — GlusterFS volumes for the Docker engine
//!
//! `libgluster` implements a Docker volume plugin that exposes remote
//! GlusterFS volumes as local mountpoints.  Mount requests are reference
//! counted per volume name so that the remote filesystem is attached once,
//! however many containers use it, and detached when the last one lets go.
//! It follows the RK8s conventions (Tokio async runtime, `tracing` for
//! observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Data model: `VolumeRecord`, `Volume`, `Scope`, `Ownership`. |
//! | [`error`] | [`PluginError`] enum covering all failure modes. |
//! | [`registry`] | [`VolumeRegistry`]: the locked name → reference-count store. |
//! | [`driver`] | [`VolumeDriver`] trait and the [`GlusterDriver`] lifecycle controller. |
//! | [`backend`] | Mount strategies: `glusterfs` CLI and REST-managed clusters. |
//! | [`message`] | Plugin protocol requests and the [`PluginResponse`] envelope. |
//! | [`transport`] | Unix-socket HTTP server and client. |

pub mod backend;
pub mod driver;
pub mod error;
pub mod message;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::{ClusterManager, MountBackend};
pub use driver::{DriverConfig, GlusterDriver, VolumeDriver};
pub use error::PluginError;
pub use message::{PluginRequest, PluginResponse};
pub use registry::VolumeRegistry;
pub use types::*;
