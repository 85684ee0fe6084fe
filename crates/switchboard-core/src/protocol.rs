//! WebSocket wire protocol.
//!
//! Each text frame carries one event as `{"event": "<name>", "data": <payload>}`.
//! Payload field names are camelCase. Negotiation payloads (`offer`, `answer`,
//! `candidate`) and the caller-supplied `callerId` are opaque JSON: the relay
//! forwards them verbatim and never looks inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, UserId};

/// Message sent to the caller of an offer whose target is not registered.
pub const USER_NOT_AVAILABLE: &str = "User not available";

/// Event names accepted from clients.
pub const INBOUND_EVENTS: [&str; 6] = [
    "register",
    "call-offer",
    "call-answer",
    "ice-candidate",
    "call-reject",
    "call-end",
];

/// Client → relay events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Bind the asserted identity to this connection.
    Register(UserId),
    /// Start a call with `targetUserId`.
    CallOffer(CallOffer),
    /// Accept a call from `targetUserId`.
    CallAnswer(CallAnswer),
    /// Trickle a connectivity candidate to `targetUserId`.
    IceCandidate(IceCandidate),
    /// Decline a call from `targetUserId`.
    CallReject(Target),
    /// Hang up on `targetUserId`.
    CallEnd(Target),
}

/// Payload of `call-offer`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    /// Identity to ring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    /// Session description, opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<Value>,
    /// Caller label supplied by the client, forwarded as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<Value>,
}

/// Payload of `call-answer`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    /// Identity of the caller being answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    /// Session description, opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
}

/// Payload of `ice-candidate` (inbound).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Identity of the remote peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
    /// Connectivity candidate, opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
}

/// Payload of `call-reject` and `call-end`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Identity of the remote peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<UserId>,
}

impl InboundEvent {
    /// Decode one text frame.
    pub fn from_frame(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame).map_err(ProtocolError::InvalidJson)?;
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingEvent)?
            .to_owned();
        if !INBOUND_EVENTS.contains(&event.as_str()) {
            return Err(ProtocolError::UnknownEvent(event));
        }
        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { event, source })
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::CallOffer(_) => "call-offer",
            Self::CallAnswer(_) => "call-answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::CallReject(_) => "call-reject",
            Self::CallEnd(_) => "call-end",
        }
    }

    /// Target identity of a call-control event. `None` for `register` and
    /// for call-control events that omitted `targetUserId`.
    pub fn target(&self) -> Option<&UserId> {
        match self {
            Self::Register(_) => None,
            Self::CallOffer(p) => p.target_user_id.as_ref(),
            Self::CallAnswer(p) => p.target_user_id.as_ref(),
            Self::IceCandidate(p) => p.target_user_id.as_ref(),
            Self::CallReject(p) | Self::CallEnd(p) => p.target_user_id.as_ref(),
        }
    }
}

/// Relay → client events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Acknowledges a `register` to its sender.
    #[serde(rename_all = "camelCase")]
    Registered {
        /// Identity just bound.
        user_id: UserId,
        /// The sender's own connection handle.
        socket_id: ConnectionId,
    },
    /// Full set of bound identities, sent to every connection.
    UsersOnline(Vec<UserId>),
    /// An offer relayed to its target.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        /// Caller label exactly as the offerer sent it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller_id: Option<Value>,
        /// Session description, opaque.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<Value>,
    },
    /// An answer relayed to the caller.
    #[serde(rename_all = "camelCase")]
    CallAnswered {
        /// Session description, opaque.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<Value>,
        /// Identity of the answering connection, if it registered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answered_by: Option<UserId>,
    },
    /// A candidate relayed to the remote peer.
    IceCandidate {
        /// Connectivity candidate, opaque.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<Value>,
        /// Identity of the sending connection, if it registered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<UserId>,
    },
    /// A rejection relayed to the caller.
    #[serde(rename_all = "camelCase")]
    CallRejected {
        /// Identity of the rejecting connection, if it registered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejected_by: Option<UserId>,
    },
    /// A hang-up relayed to the remote peer.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        /// Identity of the hanging-up connection, if it registered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ended_by: Option<UserId>,
    },
    /// Sent back to an offerer whose target is not registered.
    CallError {
        /// Human-readable reason.
        message: String,
    },
}

impl OutboundEvent {
    /// The `call-error` sent when an offer's target is not registered.
    pub fn user_not_available() -> Self {
        Self::CallError {
            message: USER_NOT_AVAILABLE.to_owned(),
        }
    }

    /// Encode as one text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::UsersOnline(_) => "users-online",
            Self::IncomingCall { .. } => "incoming-call",
            Self::CallAnswered { .. } => "call-answered",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::CallRejected { .. } => "call-rejected",
            Self::CallEnded { .. } => "call-ended",
            Self::CallError { .. } => "call-error",
        }
    }
}
