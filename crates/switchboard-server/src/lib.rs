//! # switchboard-server
//!
//! Presence registry and call-signaling relay behind an Axum WebSocket
//! endpoint.
//!
//! - [`presence`]: identity → connection bindings, last writer wins
//! - [`relay`]: reacts to each inbound event (register, offer, answer, ...)
//! - [`websocket`]: connection state, hub, and the per-client session loop
//! - [`server`]: routes (`/ws`, `/health`, `/metrics`) and `listen()`
//! - [`config`], [`health`], [`metrics`], [`shutdown`]: ambient plumbing

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod presence;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use presence::PresenceRegistry;
pub use relay::{Delivery, RelayEngine};
pub use server::SwitchboardServer;
