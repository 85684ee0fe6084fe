//! `/health` endpoint.

use serde::Serialize;
use switchboard_core::UserId;

use crate::presence::PresenceRegistry;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is up.
    pub status: &'static str,
    /// Bound identities, sorted.
    pub users: Vec<UserId>,
    /// Number of bound identities. Connections that never registered are
    /// not counted.
    pub connections: usize,
}

/// Snapshot the registry into a health response.
pub fn health_check(presence: &PresenceRegistry) -> HealthResponse {
    let bindings = presence.lock();
    HealthResponse {
        status: "ok",
        users: bindings.identities(),
        connections: bindings.len(),
    }
}
