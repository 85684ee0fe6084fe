//! Relay engine: one reaction per inbound event.
//!
//! The engine is stateless apart from the presence registry and the
//! connection hub it is handed. It does not track calls, so any call-control
//! event is forwarded in any order, and a connection that never registered
//! may still relay (its sender fields are simply omitted).

use std::sync::Arc;

use metrics::{counter, gauge};
use switchboard_core::protocol::{CallAnswer, CallOffer, IceCandidate, Target};
use switchboard_core::{InboundEvent, OutboundEvent, UserId};
use tracing::{debug, info};

use crate::metrics::{
    PRESENCE_EVICTIONS_TOTAL, PRESENCE_IDENTITIES, PRESENCE_REGISTRATIONS_TOTAL, RELAY_EVENTS_TOTAL,
    RELAY_UNDELIVERABLE_TOTAL,
};
use crate::presence::{Bindings, PresenceRegistry};
use crate::websocket::connection::ClientConnection;
use crate::websocket::hub::ConnectionHub;

/// What became of one inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The sender was bound and the presence broadcast went out.
    Registered,
    /// The target resolved and the relayed event was enqueued for it.
    Delivered,
    /// `call-offer` to an unbound target; the sender got `call-error`.
    Undeliverable,
    /// Target unbound (or gone); the event was absorbed.
    Dropped,
}

/// Routes signaling events between registered connections.
pub struct RelayEngine {
    presence: Arc<PresenceRegistry>,
    hub: Arc<ConnectionHub>,
}

impl RelayEngine {
    /// Build an engine over shared registry and hub.
    pub fn new(presence: Arc<PresenceRegistry>, hub: Arc<ConnectionHub>) -> Self {
        Self { presence, hub }
    }

    /// Apply one event received on `conn`.
    pub fn handle(&self, conn: &ClientConnection, event: InboundEvent) -> Delivery {
        let name = event.event_name();
        counter!(RELAY_EVENTS_TOTAL, "event" => name).increment(1);

        let delivery = match event {
            InboundEvent::Register(identity) => self.register(conn, identity),
            InboundEvent::CallOffer(CallOffer {
                target_user_id,
                offer,
                caller_id,
            }) => {
                let incoming = OutboundEvent::IncomingCall { caller_id, offer };
                let delivery = self.forward(target_user_id.as_ref(), &incoming);
                if delivery == Delivery::Dropped {
                    let _ = conn.send_event(&OutboundEvent::user_not_available());
                    Delivery::Undeliverable
                } else {
                    delivery
                }
            }
            InboundEvent::CallAnswer(CallAnswer { target_user_id, answer }) => self.forward(
                target_user_id.as_ref(),
                &OutboundEvent::CallAnswered {
                    answer,
                    answered_by: conn.identity(),
                },
            ),
            InboundEvent::IceCandidate(IceCandidate {
                target_user_id,
                candidate,
            }) => self.forward(
                target_user_id.as_ref(),
                &OutboundEvent::IceCandidate {
                    candidate,
                    from: conn.identity(),
                },
            ),
            InboundEvent::CallReject(Target { target_user_id }) => self.forward(
                target_user_id.as_ref(),
                &OutboundEvent::CallRejected {
                    rejected_by: conn.identity(),
                },
            ),
            InboundEvent::CallEnd(Target { target_user_id }) => self.forward(
                target_user_id.as_ref(),
                &OutboundEvent::CallEnded {
                    ended_by: conn.identity(),
                },
            ),
        };

        if matches!(delivery, Delivery::Undeliverable | Delivery::Dropped) {
            counter!(RELAY_UNDELIVERABLE_TOTAL, "event" => name).increment(1);
        }
        delivery
    }

    /// Release every binding `conn` still holds and, if any were released,
    /// broadcast the new presence list. Returns the freed identities.
    pub fn disconnect(&self, conn: &ClientConnection) -> Vec<UserId> {
        let mut bindings = self.presence.lock();
        let freed = bindings.remove_by_handle(&conn.id);
        if !freed.is_empty() {
            info!(conn_id = %conn.id, freed = ?freed, "identities released");
            self.publish_presence(&bindings);
        }
        freed
    }

    fn register(&self, conn: &ClientConnection, identity: UserId) -> Delivery {
        let mut bindings = self.presence.lock();
        let evicted = bindings.register(identity.clone(), conn.id.clone());
        conn.set_identity(identity.clone());

        counter!(PRESENCE_REGISTRATIONS_TOTAL).increment(1);
        if let Some(previous) = &evicted {
            counter!(PRESENCE_EVICTIONS_TOTAL).increment(1);
            info!(
                user_id = %identity,
                conn_id = %conn.id,
                evicted = %previous,
                "identity taken over"
            );
        } else {
            info!(user_id = %identity, conn_id = %conn.id, "identity registered");
        }

        let _ = conn.send_event(&OutboundEvent::Registered {
            user_id: identity,
            socket_id: conn.id.clone(),
        });
        self.publish_presence(&bindings);
        Delivery::Registered
    }

    /// Broadcast the snapshot in `bindings`. Called with the registry lock
    /// held so snapshots go out in mutation order.
    #[allow(clippy::cast_precision_loss)]
    fn publish_presence(&self, bindings: &Bindings) {
        gauge!(PRESENCE_IDENTITIES).set(bindings.len() as f64);
        let _ = self.hub.broadcast_all(&OutboundEvent::UsersOnline(bindings.identities()));
    }

    fn forward(&self, target: Option<&UserId>, event: &OutboundEvent) -> Delivery {
        let Some(target) = target else {
            debug!(event = event.event_name(), "no target given, dropping");
            return Delivery::Dropped;
        };
        let Some(handle) = self.presence.resolve(target) else {
            debug!(target_user_id = %target, event = event.event_name(), "target not registered");
            return Delivery::Dropped;
        };
        if self.hub.get(&handle).is_none() {
            debug!(target_user_id = %target, conn_id = %handle, "target is disconnecting");
            return Delivery::Dropped;
        }
        let _ = self.hub.send_to(&handle, event);
        Delivery::Delivered
    }
}
