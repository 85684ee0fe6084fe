//! `SwitchboardServer`: Axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use switchboard_core::ConnectionId;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{self as server_metrics, WS_CONNECTIONS_REJECTED_TOTAL};
use crate::presence::PresenceRegistry;
use crate::relay::RelayEngine;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::ConnectionHub;
use crate::websocket::session::{run_ws_session, SessionConfig};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    /// Event router.
    pub relay: Arc<RelayEngine>,
    /// Identity bindings.
    pub presence: Arc<PresenceRegistry>,
    /// Live connections.
    pub hub: Arc<ConnectionHub>,
    /// Process-wide cancellation.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
    /// Upgrades beyond this many live connections get 503.
    pub max_connections: usize,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
    /// Per-session settings.
    pub session: SessionConfig,
}

/// The signaling relay server.
pub struct SwitchboardServer {
    config: ServerConfig,
    presence: Arc<PresenceRegistry>,
    hub: Arc<ConnectionHub>,
    relay: Arc<RelayEngine>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
}

impl SwitchboardServer {
    /// Build a server with an empty registry. `metrics` renders `/metrics`;
    /// pass the handle from [`install_recorder`](server_metrics::install_recorder)
    /// in production.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let hub = Arc::new(ConnectionHub::new());
        let relay = Arc::new(RelayEngine::new(Arc::clone(&presence), Arc::clone(&hub)));
        Self {
            config,
            presence,
            hub,
            relay,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
        }
    }

    /// Routes: `/ws`, `/health`, `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            presence: Arc::clone(&self.presence),
            hub: Arc::clone(&self.hub),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            session: SessionConfig::from(&self.config),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in a background task until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(error) = result {
                error!(%error, "server stopped with error");
            }
        });

        info!(%addr, max_connections = self.config.max_connections, "switchboard listening");
        Ok((addr, handle))
    }

    /// Identity bindings.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Live connections.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let live = state.hub.connection_count();
    if live >= state.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(live, max = state.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let id = ConnectionId::new();
    let token = state.shutdown.session_token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, id, state.relay, state.hub, state.session, token)
        })
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(&state.presence))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        server_metrics::render(&state.metrics),
    )
}
