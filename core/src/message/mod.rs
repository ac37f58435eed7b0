//! Message model: the in-memory envelope and the routed packet wire
//! format, the two representations a message takes inside the engine.

pub mod codec;
pub mod types;

pub use codec::{CodecError, RoutedPacket, PACKET_HEADER_LEN};
pub use types::{MessageEnvelope, MessageType, QosLevel, BROADCAST, MAX_HOPS};
