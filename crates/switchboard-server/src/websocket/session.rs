//! One WebSocket client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use switchboard_core::{ConnectionId, InboundEvent, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::hub::ConnectionHub;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_INVALID_FRAMES_TOTAL,
};
use crate::relay::RelayEngine;

/// How long the writer gets to flush a Close frame once the reader is done.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Per-session knobs, taken from [`ServerConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Capacity of the outbound queue.
    pub send_queue_capacity: usize,
    /// Ping period.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered dead.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// What an inbound WebSocket message means to the relay.
#[derive(Debug, PartialEq, Eq)]
enum Incoming<'a> {
    Frame(&'a str),
    Liveness,
    Close,
    NotUtf8(usize),
}

fn classify(msg: &Message) -> Incoming<'_> {
    match msg {
        Message::Text(text) => Incoming::Frame(text.as_str()),
        Message::Binary(data) => match std::str::from_utf8(data) {
            Ok(text) => Incoming::Frame(text),
            Err(_) => Incoming::NotUtf8(data.len()),
        },
        Message::Ping(_) | Message::Pong(_) => Incoming::Liveness,
        Message::Close(_) => Incoming::Close,
    }
}

/// Drive one connection until either side goes away.
///
/// A writer task drains the outbound queue and pings the client; the
/// reader (this task) decodes frames and hands them to the relay. On exit
/// the connection leaves the hub first, then its bindings are released.
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_ws_session(
    ws: WebSocket,
    id: ConnectionId,
    relay: Arc<RelayEngine>,
    hub: Arc<ConnectionHub>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(id, send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    hub.add(Arc::clone(&connection));

    let writer_conn = Arc::clone(&connection);
    let writer_shutdown = shutdown.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(config.heartbeat_interval);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text((*frame).clone().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    let silent = writer_conn.last_pong_elapsed();
                    if !writer_conn.check_alive() && silent > config.heartbeat_timeout {
                        warn!(
                            timeout = ?config.heartbeat_timeout,
                            "client unresponsive, disconnecting"
                        );
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.close_token().cancelled() => break,
                () = writer_shutdown.cancelled() => break,
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        writer_conn.close();
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = connection.close_token().cancelled() => break,
            () = shutdown.cancelled() => break,
        };
        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(error)) => {
                debug!(%error, "websocket read failed");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match classify(&msg) {
            Incoming::Frame(text) => dispatch(&relay, &connection, text),
            Incoming::Liveness => {}
            Incoming::Close => {
                debug!("client sent close frame");
                break;
            }
            Incoming::NotUtf8(len) => {
                counter!(WS_INVALID_FRAMES_TOTAL, "kind" => "not_utf8").increment(1);
                warn!(len, "dropping non-UTF-8 binary frame");
            }
        }
    }

    connection.close();
    let freed = release(&hub, &relay, &connection);
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(
        freed = freed.len(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Take `connection` out of routing: leave the hub, then release its
/// bindings. Must not wait on the writer: a stalled socket stays
/// unreachable from the moment the reader exits.
fn release(hub: &ConnectionHub, relay: &RelayEngine, connection: &ClientConnection) -> Vec<UserId> {
    let _ = hub.remove(&connection.id);
    relay.disconnect(connection)
}

fn dispatch(relay: &RelayEngine, connection: &ClientConnection, text: &str) {
    match InboundEvent::from_frame(text) {
        Ok(event) => {
            let event_name = event.event_name();
            let target = event.target().cloned();
            let delivery = relay.handle(connection, event);
            debug!(event = event_name, target_user_id = ?target, ?delivery, "event handled");
        }
        Err(error) => {
            counter!(WS_INVALID_FRAMES_TOTAL, "kind" => error.error_kind()).increment(1);
            warn!(kind = error.error_kind(), %error, "dropping malformed frame");
        }
    }
}
