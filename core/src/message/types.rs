// Message types — the envelope every mesh hop sees

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target id sentinel for flood delivery to every node.
pub const BROADCAST: &str = "BROADCAST";

/// Hard cap on both the starting ttl and the hop count.
pub const MAX_HOPS: u8 = 15;

/// QoS tier a message class maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QosLevel {
    /// PTT, SOS, system, heartbeat — always wins.
    Critical,
    /// Text, location, notification, image.
    Normal,
    /// Log, sync, file, telemetry — first to be throttled.
    Bulk,
}

impl QosLevel {
    /// Static base priority for the tier.
    pub fn base_priority(&self) -> u32 {
        match self {
            QosLevel::Critical => 100,
            QosLevel::Normal => 50,
            QosLevel::Bulk => 10,
        }
    }
}

/// What kind of message this is. Each kind carries a fixed QoS tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    // Critical
    Ptt,
    Sos,
    System,
    Heartbeat,
    // Normal
    Text,
    Location,
    Notification,
    Image,
    // Bulk
    Log,
    Sync,
    File,
    Telemetry,
}

impl MessageType {
    pub fn qos(&self) -> QosLevel {
        match self {
            MessageType::Ptt | MessageType::Sos | MessageType::System | MessageType::Heartbeat => {
                QosLevel::Critical
            }
            MessageType::Text
            | MessageType::Location
            | MessageType::Notification
            | MessageType::Image => QosLevel::Normal,
            MessageType::Log | MessageType::Sync | MessageType::File | MessageType::Telemetry => {
                QosLevel::Bulk
            }
        }
    }
}

/// A message in flight through the mesh.
///
/// Envelopes are immutable by convention: every relay step produces a
/// NEW value via [`MessageEnvelope::relayed_via`] rather than mutating a
/// shared one, so concurrent transports can never alias each other's
/// hop bookkeeping. The only field rewritten in place between dispatch
/// cycles is `calculated_priority`, which is derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Globally distinguishing message id (UUID v4 string).
    pub id: String,
    /// Originating node id.
    pub sender_id: String,
    /// Destination node id, or the [`BROADCAST`] sentinel.
    pub target_id: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Unix timestamp (milliseconds) at creation.
    pub timestamp: u64,
    /// Remaining relay budget. 0 is terminal.
    pub ttl: u8,
    /// Hops taken so far. Never exceeds [`MAX_HOPS`].
    pub hop_count: u8,
    /// Immediate sender; used to prevent reflection.
    pub last_hop_node_id: String,
    /// Priority derived per dispatch cycle by the QoS layer.
    pub calculated_priority: u32,
    pub message_type: MessageType,
}

impl MessageEnvelope {
    /// Create a fresh envelope originating at `sender_id`.
    ///
    /// The ttl is clamped to [`MAX_HOPS`].
    pub fn new(
        sender_id: impl Into<String>,
        target_id: impl Into<String>,
        payload: Vec<u8>,
        message_type: MessageType,
        ttl: u8,
        timestamp: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            target_id: target_id.into(),
            payload,
            timestamp,
            ttl: ttl.min(MAX_HOPS),
            hop_count: 0,
            last_hop_node_id: String::new(),
            calculated_priority: message_type.qos().base_priority(),
            message_type,
        }
    }

    /// Is this a flood message for everyone?
    pub fn is_broadcast(&self) -> bool {
        self.target_id == BROADCAST
    }

    /// Produce the relay copy for the next hop: ttl − 1, hop + 1,
    /// last hop stamped with the relaying node.
    pub fn relayed_via(&self, node_id: impl Into<String>) -> Self {
        Self {
            ttl: self.ttl.saturating_sub(1),
            hop_count: self.hop_count.saturating_add(1).min(MAX_HOPS),
            last_hop_node_id: node_id.into(),
            ..self.clone()
        }
    }

    /// A ttl of zero ends the message's life; it must not be relayed.
    pub fn is_expired(&self) -> bool {
        self.ttl == 0
    }

    /// Copy with the priority the QoS layer computed for this cycle.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.calculated_priority = priority;
        self
    }
}
