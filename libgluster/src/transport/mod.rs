//! Unix-socket HTTP transport for the Docker volume plugin protocol.
//!
//! [`server::PluginServer`] is what the engine talks to; [`client::PluginClient`]
//! speaks the same protocol from the other end and is used by tooling and
//! the integration tests.

pub mod client;
pub mod server;
