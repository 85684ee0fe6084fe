//! WebSocket connections: per-client state, the live-connection hub, and the
//! session loop.

pub mod connection;
pub mod hub;
pub mod session;
