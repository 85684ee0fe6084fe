//! End-to-end tests against a live server with real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use switchboard_server::config::ServerConfig;
use switchboard_server::server::SwitchboardServer;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_with(config: ServerConfig) -> (SocketAddr, Arc<SwitchboardServer>) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(SwitchboardServer::new(config, metrics));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn boot_server() -> (SocketAddr, Arc<SwitchboardServer>) {
    boot_with(ServerConfig::default()).await
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data});
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until a `users-online` frame lists exactly `expected`.
async fn await_online(ws: &mut WsStream, expected: &[&str]) {
    loop {
        let msg = read_json(ws).await;
        if msg["event"] == "users-online" && msg["data"] == json!(expected) {
            return;
        }
    }
}

/// Assert no text frame arrives for a short while.
async fn assert_silent(ws: &mut WsStream) {
    let result = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => {}
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    if let Ok(text) = result {
        panic!("expected silence, got {text}");
    }
}

/// Register and consume the ack. Returns the `socketId` the server assigned.
async fn register(ws: &mut WsStream, user: &str) -> String {
    send(ws, "register", json!(user)).await;
    loop {
        let msg = read_json(ws).await;
        if msg["event"] == "registered" {
            assert_eq!(msg["data"]["userId"], user);
            return msg["data"]["socketId"].as_str().unwrap().to_owned();
        }
    }
}

async fn health(addr: SocketAddr) -> Value {
    reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_connections(server: &SwitchboardServer, n: usize) {
    timeout(TIMEOUT, async {
        while server.hub().connection_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn e2e_register_acks_sender_and_broadcasts() {
    let (addr, _server) = boot_server().await;
    let mut alice = connect(addr).await;
    let mut watcher = connect(addr).await;

    send(&mut alice, "register", json!("alice")).await;

    let ack = read_json(&mut alice).await;
    assert_eq!(ack["event"], "registered");
    assert_eq!(ack["data"]["userId"], "alice");
    assert!(ack["data"]["socketId"].as_str().unwrap().starts_with("conn_"));

    let online = read_json(&mut alice).await;
    assert_eq!(online, json!({"event": "users-online", "data": ["alice"]}));
    await_online(&mut watcher, &["alice"]).await;
}

#[tokio::test]
async fn e2e_offer_routes_to_target_only() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    let _ = register(&mut b, "bob").await;
    let _ = register(&mut c, "carol").await;
    for ws in [&mut a, &mut b, &mut c] {
        await_online(ws, &["alice", "bob", "carol"]).await;
    }

    let offer = json!({"targetUserId": "bob", "offer": "o1", "callerId": "C"});
    send(&mut a, "call-offer", offer).await;

    let incoming = read_json(&mut b).await;
    assert_eq!(
        incoming,
        json!({"event": "incoming-call", "data": {"callerId": "C", "offer": "o1"}})
    );
    assert_silent(&mut a).await;
    assert_silent(&mut c).await;
}

#[tokio::test]
async fn e2e_offer_to_unbound_target_returns_call_error() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut other = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    await_online(&mut a, &["alice"]).await;
    await_online(&mut other, &["alice"]).await;

    send(&mut a, "call-offer", json!({"targetUserId": "ghost", "offer": "o1"})).await;

    let err = read_json(&mut a).await;
    assert_eq!(err, json!({"event": "call-error", "data": {"message": "User not available"}}));
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn e2e_non_offer_to_unbound_target_is_silent() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    await_online(&mut a, &["alice"]).await;

    send(&mut a, "call-answer", json!({"targetUserId": "ghost", "answer": "x"})).await;
    send(&mut a, "ice-candidate", json!({"targetUserId": "ghost", "candidate": "x"})).await;
    send(&mut a, "call-reject", json!({"targetUserId": "ghost"})).await;
    send(&mut a, "call-end", json!({"targetUserId": "ghost"})).await;

    assert_silent(&mut a).await;
}

#[tokio::test]
async fn e2e_full_call_flow() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    let _ = register(&mut b, "bob").await;
    await_online(&mut a, &["alice", "bob"]).await;
    await_online(&mut b, &["alice", "bob"]).await;

    let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"});
    send(
        &mut a,
        "call-offer",
        json!({"targetUserId": "bob", "offer": offer, "callerId": "Alice A."}),
    )
    .await;
    let incoming = read_json(&mut b).await;
    assert_eq!(incoming["event"], "incoming-call");
    assert_eq!(incoming["data"]["offer"], offer);
    assert_eq!(incoming["data"]["callerId"], "Alice A.");

    let answer = json!({"targetUserId": "alice", "answer": {"type": "answer"}});
    send(&mut b, "call-answer", answer).await;
    let answered = read_json(&mut a).await;
    assert_eq!(
        answered,
        json!({
            "event": "call-answered",
            "data": {"answer": {"type": "answer"}, "answeredBy": "bob"}
        })
    );

    let candidate = json!({"targetUserId": "bob", "candidate": {"sdpMid": "0"}});
    send(&mut a, "ice-candidate", candidate).await;
    let cand = read_json(&mut b).await;
    assert_eq!(
        cand,
        json!({"event": "ice-candidate", "data": {"candidate": {"sdpMid": "0"}, "from": "alice"}})
    );

    send(&mut b, "call-end", json!({"targetUserId": "alice"})).await;
    let ended = read_json(&mut a).await;
    assert_eq!(ended, json!({"event": "call-ended", "data": {"endedBy": "bob"}}));
}

#[tokio::test]
async fn e2e_reject_carries_rejecter() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    let _ = register(&mut b, "bob").await;
    await_online(&mut a, &["alice", "bob"]).await;

    send(&mut b, "call-reject", json!({"targetUserId": "alice"})).await;
    let rejected = read_json(&mut a).await;
    assert_eq!(rejected, json!({"event": "call-rejected", "data": {"rejectedBy": "bob"}}));
}

#[tokio::test]
async fn e2e_disconnect_frees_identity() {
    let (addr, server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = register(&mut a, "alice").await;
    let _ = register(&mut b, "bob").await;
    await_online(&mut b, &["alice", "bob"]).await;

    drop(a);
    await_online(&mut b, &["bob"]).await;
    assert!(server.presence().resolve(&"alice".into()).is_none());

    send(&mut b, "call-offer", json!({"targetUserId": "alice", "offer": "o"})).await;
    let err = read_json(&mut b).await;
    assert_eq!(err["event"], "call-error");

    let body = health(addr).await;
    assert_eq!(body, json!({"status": "ok", "users": ["bob"], "connections": 1}));
}

#[tokio::test]
async fn e2e_reregistration_moves_identity_to_latest_connection() {
    let (addr, _server) = boot_server().await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    let mut caller = connect(addr).await;

    let first_id = register(&mut first, "u").await;
    let second_id = register(&mut second, "u").await;
    assert_ne!(first_id, second_id);
    let _ = register(&mut caller, "caller").await;
    for ws in [&mut first, &mut second, &mut caller] {
        await_online(ws, &["caller", "u"]).await;
    }

    send(&mut caller, "call-offer", json!({"targetUserId": "u", "offer": "o"})).await;
    let incoming = read_json(&mut second).await;
    assert_eq!(incoming["event"], "incoming-call");
    assert_silent(&mut first).await;
}

#[tokio::test]
async fn e2e_evicted_connection_leaving_keeps_new_binding() {
    let (addr, server) = boot_server().await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    let mut caller = connect(addr).await;
    let _ = register(&mut first, "u").await;
    let _ = register(&mut second, "u").await;
    let _ = register(&mut caller, "caller").await;
    await_online(&mut caller, &["caller", "u"]).await;
    await_online(&mut second, &["caller", "u"]).await;

    drop(first);
    wait_for_connections(&server, 2).await;
    assert_silent(&mut caller).await;

    send(&mut caller, "call-offer", json!({"targetUserId": "u", "offer": "o"})).await;
    let incoming = read_json(&mut second).await;
    assert_eq!(incoming["event"], "incoming-call");
}

#[tokio::test]
async fn e2e_new_identity_then_disconnect_frees_both() {
    let (addr, _server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut watcher = connect(addr).await;
    let _ = register(&mut a, "first").await;
    let _ = register(&mut a, "second").await;
    await_online(&mut watcher, &["first", "second"]).await;

    drop(a);
    await_online(&mut watcher, &[]).await;
    let body = health(addr).await;
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn e2e_unregistered_sender_can_relay() {
    let (addr, _server) = boot_server().await;
    let mut anon = connect(addr).await;
    let mut b = connect(addr).await;
    let _ = register(&mut b, "bob").await;
    await_online(&mut b, &["bob"]).await;
    await_online(&mut anon, &["bob"]).await;

    send(&mut anon, "call-end", json!({"targetUserId": "bob"})).await;
    let ended = read_json(&mut b).await;
    assert_eq!(ended, json!({"event": "call-ended", "data": {}}));
}

#[tokio::test]
async fn e2e_malformed_frames_keep_connection_open() {
    let (addr, _server) = boot_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::text("not valid json")).await.unwrap();
    send(&mut ws, "join-room", json!({"room": 1})).await;
    send(&mut ws, "register", json!({"userId": "nested"})).await;
    assert_silent(&mut ws).await;

    let socket_id = register(&mut ws, "alice").await;
    assert!(socket_id.starts_with("conn_"));
}

#[tokio::test]
async fn e2e_binary_frames_are_accepted() {
    let (addr, _server) = boot_server().await;
    let mut ws = connect(addr).await;

    let frame = json!({"event": "register", "data": "bin"}).to_string();
    ws.send(Message::binary(frame.into_bytes())).await.unwrap();
    let ack = read_json(&mut ws).await;
    assert_eq!(ack["event"], "registered");
    assert_eq!(ack["data"]["userId"], "bin");
}

#[tokio::test]
async fn e2e_health_counts_bindings_not_sockets() {
    let (addr, server) = boot_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let _idle = connect(addr).await;
    let _ = register(&mut a, "u").await;
    let _ = register(&mut b, "u").await;
    wait_for_connections(&server, 3).await;

    let body = health(addr).await;
    assert_eq!(body, json!({"status": "ok", "users": ["u"], "connections": 1}));
}

#[tokio::test]
async fn e2e_connection_limit_returns_503() {
    let (addr, server) = boot_with(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    let _first = connect(addr).await;
    wait_for_connections(&server, 1).await;

    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 503),
        other => panic!("expected HTTP 503, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_heartbeat_timeout_frees_unresponsive_client() {
    let (addr, server) = boot_with(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    })
    .await;
    let mut watcher = connect(addr).await;
    let _ = register(&mut watcher, "watcher").await;
    let mut mute = connect(addr).await;
    let _ = register(&mut mute, "mute").await;
    await_online(&mut watcher, &["mute", "watcher"]).await;

    // `mute` is never polled again, so its pings go unanswered. The watcher
    // keeps reading and answers its own.
    await_online(&mut watcher, &["watcher"]).await;
    assert!(server.presence().resolve(&"mute".into()).is_none());
    assert!(server.presence().resolve(&"watcher".into()).is_some());
    wait_for_connections(&server, 1).await;
    drop(mute);
}

#[tokio::test]
async fn e2e_shutdown_closes_sessions() {
    let (addr, server) = boot_server().await;
    let mut ws = connect(addr).await;
    wait_for_connections(&server, 1).await;

    server.shutdown().shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "session stayed open after shutdown");
    wait_for_connections(&server, 0).await;
}
