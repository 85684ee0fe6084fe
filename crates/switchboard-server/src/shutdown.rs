//! Graceful shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits when no timeout is given.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the process-wide cancellation token. The HTTP server stops accepting
/// on cancel, and every WebSocket session closes its socket.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Child token for one session; cancelled with the root, but can also
    /// be cancelled on its own.
    pub fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Fire the token. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token and wait for the server task to finish.
    ///
    /// Returns `false` if the task was still running after `timeout`; it is
    /// aborted in that case.
    pub async fn drain(&self, handle: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();

        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                warn!(%error, "server task ended abnormally");
                true
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "server did not drain in time, aborting");
                abort.abort();
                false
            }
        }
    }
}
