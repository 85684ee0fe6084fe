//! Table of live connections and fan-out to them.

use std::sync::Arc;

use dashmap::DashMap;
use switchboard_core::{ConnectionId, OutboundEvent};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// A connection that has dropped this many frames over its lifetime is
/// closed. Its session then runs the normal disconnect cleanup.
pub const MAX_TOTAL_DROPS: u64 = 64;

/// Live connections, keyed by handle.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl ConnectionHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly upgraded connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id.clone(), connection);
    }

    /// Stop tracking a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Look up a live connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Enqueue `event` for one connection. Returns `false` if the connection
    /// is gone or its queue refused the frame.
    pub fn send_to(&self, id: &ConnectionId, event: &OutboundEvent) -> bool {
        let Some(conn) = self.get(id) else {
            debug!(conn_id = %id, event = event.event_name(), "target connection already gone");
            return false;
        };
        let sent = conn.send_event(event);
        if !sent {
            enforce_drop_limit(&conn);
        }
        sent
    }

    /// Enqueue `event` for every live connection. Returns how many accepted it.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => Arc::new(frame),
            Err(error) => {
                warn!(event = event.event_name(), %error, "failed to encode broadcast");
                return 0;
            }
        };
        let mut delivered = 0;
        for entry in &self.connections {
            let conn = entry.value();
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                enforce_drop_limit(conn);
            }
        }
        debug!(
            event = event.event_name(),
            recipients = self.connections.len(),
            delivered,
            "broadcast to all connections"
        );
        delivered
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

fn enforce_drop_limit(conn: &ClientConnection) {
    let drops = conn.drop_count();
    if drops >= MAX_TOTAL_DROPS && !conn.is_closing() {
        warn!(conn_id = %conn.id, drops, "connection keeps dropping frames, closing");
        conn.close();
    } else {
        debug!(conn_id = %conn.id, drops, "outbound queue full, frame dropped");
    }
}
