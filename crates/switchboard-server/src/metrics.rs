//! Prometheus recorder and metric names.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder, once per process.
///
/// Later calls return the same handle. If some other recorder was installed
/// first, the returned handle renders an empty registry.
pub fn install_recorder() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("prometheus metrics recorder installed");
                handle
            }
            Err(error) => {
                warn!(%error, "metrics recorder already set, /metrics will be empty");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket upgrades accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions ended (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at `max_connections` (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Inbound frames that failed to decode (counter, labels: kind).
pub const WS_INVALID_FRAMES_TOTAL: &str = "ws_invalid_frames_total";
/// WebSocket session duration in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound events handled (counter, labels: event).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Events whose target was not bound (counter, labels: event).
pub const RELAY_UNDELIVERABLE_TOTAL: &str = "relay_undeliverable_total";
/// `register` events applied (counter).
pub const PRESENCE_REGISTRATIONS_TOTAL: &str = "presence_registrations_total";
/// Registrations that took an identity from another connection (counter).
pub const PRESENCE_EVICTIONS_TOTAL: &str = "presence_evictions_total";
/// Bound identities (gauge).
pub const PRESENCE_IDENTITIES: &str = "presence_identities";
