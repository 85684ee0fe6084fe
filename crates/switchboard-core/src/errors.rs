//! Frame decoding errors.

use thiserror::Error;

/// Why an inbound WebSocket frame could not be turned into an event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON document.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The frame was JSON but had no string `event` field.
    #[error("frame has no event name")]
    MissingEvent,
    /// The frame named an event the relay does not handle.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    /// The event name was known but its `data` had the wrong shape.
    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        /// Event name from the frame.
        event: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::MissingEvent => "missing_event",
            Self::UnknownEvent(_) => "unknown_event",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}
