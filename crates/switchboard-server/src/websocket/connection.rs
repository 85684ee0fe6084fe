//! Per-connection state shared between the session tasks, the hub, and the relay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use switchboard_core::{ConnectionId, OutboundEvent, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::WS_SEND_DROPS_TOTAL;

/// One live WebSocket client.
pub struct ClientConnection {
    /// Transport handle, reported to the client as `socketId`.
    pub id: ConnectionId,
    /// Identity this connection last registered as.
    identity: Mutex<Option<UserId>>,
    /// Outbound queue drained by the session's writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When the upgrade completed.
    connected_at: Instant,
    /// Set on every Pong, cleared by each heartbeat check.
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames dropped because the outbound queue was full or closed.
    dropped_messages: AtomicU64,
    close: CancellationToken,
}

impl ClientConnection {
    /// Wrap the sending half of a fresh outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Attach the identity asserted by the latest `register`.
    ///
    /// The identity stays attached even if another connection later takes
    /// the binding over; it is only used to label events this connection
    /// sends.
    pub fn set_identity(&self, identity: UserId) {
        *self.identity.lock() = Some(identity);
    }

    /// Identity attached by the latest `register`, if any.
    pub fn identity(&self) -> Option<UserId> {
        self.identity.lock().clone()
    }

    /// Enqueue a pre-encoded frame without waiting.
    ///
    /// Returns `false` and bumps the drop counter when the queue is full or
    /// the writer has gone away.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(WS_SEND_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Encode and enqueue one event.
    pub fn send_event(&self, event: &OutboundEvent) -> bool {
        match event.to_frame() {
            Ok(frame) => self.send(Arc::new(frame)),
            Err(error) => {
                warn!(
                    conn_id = %self.id,
                    event = event.event_name(),
                    %error,
                    "failed to encode event"
                );
                false
            }
        }
    }

    /// Lifetime count of dropped frames.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a Pong (or any other sign of life).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last Pong, or since the upgrade if none arrived yet.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and clear the alive flag. `true` if a Pong arrived since the
    /// previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Ask the session to close this connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token the writer task waits on.
    pub fn close_token(&self) -> &CancellationToken {
        &self.close
    }

    /// Time since the upgrade completed.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}
