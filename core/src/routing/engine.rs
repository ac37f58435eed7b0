//! Envelope-level routing: local delivery plus controlled flood relay.

use crate::clock::SharedClock;
use crate::message::MessageEnvelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Seen envelope ids older than this are forgotten.
pub const ROUTE_SEEN_EXPIRY_MS: u64 = 5 * 60 * 1000;

/// Where routed envelopes go. Implementations wrap the application
/// inbox and whatever transports are attached; the engine itself never
/// names a concrete transport.
pub trait RouteSink: Send + Sync {
    /// The envelope is addressed to this node (or broadcast).
    fn deliver_local(&self, envelope: &MessageEnvelope);
    /// Retransmit the already-restamped copy to reachable peers.
    fn relay(&self, envelope: MessageEnvelope);
}

/// Flood router for application envelopes.
pub struct RoutingEngine {
    local_node_id: String,
    seen: Mutex<HashMap<String, u64>>,
    clock: SharedClock,
}

impl RoutingEngine {
    pub fn new(local_node_id: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            seen: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Route one incoming envelope.
    ///
    /// Broadcast envelopes are both delivered locally and relayed; that
    /// double role is what makes flood delivery reach every node.
    pub fn process_incoming(&self, envelope: &MessageEnvelope, sink: &dyn RouteSink) {
        let now = self.clock.now_millis();
        {
            let mut seen = self.seen.lock();
            seen.retain(|_, at| now.saturating_sub(*at) <= ROUTE_SEEN_EXPIRY_MS);
            if seen.contains_key(&envelope.id) {
                debug!(message_id = %envelope.id, "already routed, ignoring");
                return;
            }
            seen.insert(envelope.id.clone(), now);
        }

        let for_us = envelope.is_broadcast() || envelope.target_id == self.local_node_id;
        if for_us {
            sink.deliver_local(envelope);
        }

        let relay_on = envelope.target_id != self.local_node_id && envelope.ttl > 0;
        if relay_on {
            sink.relay(envelope.relayed_via(&self.local_node_id));
        }
    }
}
