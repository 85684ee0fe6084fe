//! # switchboard-core
//!
//! Shared vocabulary of the Switchboard signaling relay.
//!
//! - [`ids`]: connection handles and user identities
//! - [`protocol`]: inbound/outbound WebSocket events and their JSON framing
//! - [`errors`]: frame decoding errors

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, UserId};
pub use protocol::{InboundEvent, OutboundEvent};
