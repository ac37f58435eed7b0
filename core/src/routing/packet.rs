//! Binary packet routing on the 74-byte fixed-header layout.
//!
//! This layer works directly on wire bytes so a relay node never has to
//! deserialize a payload it will only retransmit.

use crate::message::codec::{
    self, RoutedPacket, HOP_COUNT_OFFSET, PACKET_HEADER_LEN, TTL_OFFSET,
};
use crate::message::{BROADCAST, MAX_HOPS};
use crate::metrics::MetricCollector;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hard cap on the replay set before it is reset.
pub const REPLAY_SET_CAPACITY: usize = 5_000;

/// Outcome of routing one raw packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Addressed to this node; hand the payload up.
    Consume,
    /// Addressed elsewhere and still alive; retransmit.
    Forward,
    DropDuplicate,
    DropExpired,
    /// Too short to carry the fixed header.
    DropInvalid,
}

/// Stateful router for raw mesh packets.
pub struct PacketRouter {
    local_node_id: String,
    seen_packet_ids: Mutex<HashSet<u64>>,
    metrics: Arc<MetricCollector>,
}

impl PacketRouter {
    pub fn new(local_node_id: impl Into<String>, metrics: Arc<MetricCollector>) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            seen_packet_ids: Mutex::new(HashSet::new()),
            metrics,
        }
    }

    /// Classify one received packet.
    ///
    /// The packet id is recorded before the ttl check, so an expired
    /// packet arriving twice is a duplicate the second time. When the
    /// replay set outgrows its cap it is cleared outright rather than
    /// evicted entry by entry; a brief window of re-accepted duplicates
    /// is the accepted trade for bounded memory on long uptimes.
    pub fn on_receive_packet(&self, bytes: &[u8]) -> RouteDecision {
        if bytes.len() < PACKET_HEADER_LEN {
            self.metrics.incr_invalid_packets();
            warn!(len = bytes.len(), "packet below minimum size, dropping");
            return RouteDecision::DropInvalid;
        }

        let packet = match RoutedPacket::decode(bytes) {
            Ok(p) => p,
            Err(_) => {
                self.metrics.incr_invalid_packets();
                return RouteDecision::DropInvalid;
            }
        };

        {
            let mut seen = self.seen_packet_ids.lock();
            if !seen.insert(packet.packet_id) {
                self.metrics.incr_replay_drops();
                return RouteDecision::DropDuplicate;
            }
            if seen.len() > REPLAY_SET_CAPACITY {
                debug!(cap = REPLAY_SET_CAPACITY, "replay set full, resetting");
                seen.clear();
                seen.insert(packet.packet_id);
            }
        }

        if packet.ttl == 0 || packet.hop_count >= MAX_HOPS {
            self.metrics.incr_expired_drops();
            return RouteDecision::DropExpired;
        }

        if packet.target_id == self.local_node_id || packet.target_id == BROADCAST {
            RouteDecision::Consume
        } else {
            RouteDecision::Forward
        }
    }

    /// Rewrite ttl and hop count in place for retransmission.
    ///
    /// Callers pass bytes that already survived `on_receive_packet`, so
    /// the header offsets are in range.
    pub fn prepare_for_forwarding(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        if out.len() >= PACKET_HEADER_LEN {
            out[TTL_OFFSET] = out[TTL_OFFSET].saturating_sub(1);
            out[HOP_COUNT_OFFSET] = out[HOP_COUNT_OFFSET].saturating_add(1);
        }
        out
    }

    /// Number of packet ids currently tracked (diagnostics).
    pub fn seen_count(&self) -> usize {
        self.seen_packet_ids.lock().len()
    }
}

/// Helper shared by tests and simulations: build a routable packet.
pub fn build_packet(
    packet_id: u64,
    ttl: u8,
    hop_count: u8,
    source_id: &str,
    target_id: &str,
    payload: &[u8],
) -> Result<Vec<u8>, codec::CodecError> {
    RoutedPacket {
        packet_id,
        ttl,
        hop_count,
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        payload: payload.to_vec(),
    }
    .encode()
}
