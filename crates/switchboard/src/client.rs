//! `switchboard connect`: a line-oriented diagnostic client.
//!
//! Every event received from the relay is printed to stdout as one JSON
//! line. Each non-empty line read from stdin is sent verbatim as a frame.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use switchboard_core::{InboundEvent, OutboundEvent, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Frame that registers `user`.
pub fn register_frame(user: &str) -> Result<String> {
    serde_json::to_string(&InboundEvent::Register(UserId::from(user)))
        .context("Failed to encode register frame")
}

/// Normalize a received frame for printing. Known events are re-encoded
/// compactly; anything else is passed through untouched.
pub fn render_line(frame: &str) -> String {
    match serde_json::from_str::<OutboundEvent>(frame) {
        Ok(event) => event.to_frame().unwrap_or_else(|_| frame.to_owned()),
        Err(error) => {
            debug!(%error, "unrecognized frame from relay");
            frame.to_owned()
        }
    }
}

/// Connect to `url`, optionally register as `user`, and pump frames until
/// either side closes.
pub async fn run(url: &str, user: Option<&str>) -> Result<()> {
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    info!(url, "connected");
    let (mut ws_tx, mut ws_rx) = ws.split();

    if let Some(user) = user {
        ws_tx
            .send(Message::text(register_frame(user)?))
            .await
            .context("Failed to send register")?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => println!("{}", render_line(&text)),
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "relay closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error).context("Connection failed"),
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line.context("Failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if InboundEvent::from_frame(&line).is_err() {
                        warn!("sending a frame the relay will not understand");
                    }
                    ws_tx.send(Message::text(line)).await.context("Failed to send frame")?;
                }
                None => stdin_open = false,
            },
        }
    }
    Ok(())
}
