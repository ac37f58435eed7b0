//! Routed packet wire format.
//!
//! Fixed binary layout (big-endian, no padding):
//! ```text
//! [8]  packet_id
//! [1]  ttl
//! [1]  hop_count
//! [32] source_id (zero-padded UTF-8)
//! [32] target_id (zero-padded UTF-8)
//! [N]  payload
//! ```
//! Minimum 74 bytes; anything shorter is malformed radio input and is
//! dropped by the router, never raised up the stack.

use thiserror::Error;

/// Fixed header size: 8 + 1 + 1 + 32 + 32 bytes.
pub const PACKET_HEADER_LEN: usize = 74;

/// Byte offset of the ttl field within the header.
pub const TTL_OFFSET: usize = 8;

/// Byte offset of the hop count field within the header.
pub const HOP_COUNT_OFFSET: usize = 9;

/// Maximum length of a node id in the fixed 32-byte field.
pub const NODE_ID_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    BufferTooShort { need: usize, got: usize },

    #[error("node id longer than {NODE_ID_LEN} bytes: {0}")]
    NodeIdTooLong(usize),
}

/// Decoded view of a routed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPacket {
    pub packet_id: u64,
    pub ttl: u8,
    pub hop_count: u8,
    pub source_id: String,
    pub target_id: String,
    pub payload: Vec<u8>,
}

impl RoutedPacket {
    /// Serialize to the fixed wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_LEN + self.payload.len());

        buf.extend_from_slice(&self.packet_id.to_be_bytes());
        buf.push(self.ttl);
        buf.push(self.hop_count);
        buf.extend_from_slice(&encode_node_id(&self.source_id)?);
        buf.extend_from_slice(&encode_node_id(&self.target_id)?);
        buf.extend_from_slice(&self.payload);

        Ok(buf)
    }

    /// Parse the fixed wire layout.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < PACKET_HEADER_LEN {
            return Err(CodecError::BufferTooShort {
                need: PACKET_HEADER_LEN,
                got: data.len(),
            });
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[..8]);
        let packet_id = u64::from_be_bytes(id_bytes);

        let ttl = data[TTL_OFFSET];
        let hop_count = data[HOP_COUNT_OFFSET];

        let source_id = decode_node_id(&data[10..10 + NODE_ID_LEN]);
        let target_id = decode_node_id(&data[42..42 + NODE_ID_LEN]);
        let payload = data[PACKET_HEADER_LEN..].to_vec();

        Ok(Self {
            packet_id,
            ttl,
            hop_count,
            source_id,
            target_id,
            payload,
        })
    }
}

/// Zero-pad a node id into its fixed 32-byte field.
pub fn encode_node_id(id: &str) -> Result<[u8; NODE_ID_LEN], CodecError> {
    let bytes = id.as_bytes();
    if bytes.len() > NODE_ID_LEN {
        return Err(CodecError::NodeIdTooLong(bytes.len()));
    }
    let mut field = [0u8; NODE_ID_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Recover a node id from its fixed field, stripping the zero padding.
pub fn decode_node_id(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_matches(char::from(0))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> RoutedPacket {
        RoutedPacket {
            packet_id: 0x0102_0304_0506_0708,
            ttl: 10,
            hop_count: 2,
            source_id: "node-alpha".to_string(),
            target_id: "node-beta".to_string(),
            payload: b"payload bytes".to_vec(),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = make_packet();
        let bytes = original.encode().unwrap();

        assert_eq!(bytes.len(), PACKET_HEADER_LEN + original.payload.len());

        let decoded = RoutedPacket::decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_big_endian_packet_id() {
        let bytes = make_packet().encode().unwrap();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[7], 0x08);
    }

    #[test]
    fn test_field_offsets() {
        let bytes = make_packet().encode().unwrap();
        assert_eq!(bytes[TTL_OFFSET], 10);
        assert_eq!(bytes[HOP_COUNT_OFFSET], 2);
    }

    #[test]
    fn test_too_short_rejected() {
        let result = RoutedPacket::decode(&[0u8; PACKET_HEADER_LEN - 1]);
        assert_eq!(
            result,
            Err(CodecError::BufferTooShort {
                need: PACKET_HEADER_LEN,
                got: PACKET_HEADER_LEN - 1,
            })
        );
    }

    #[test]
    fn test_minimum_packet_has_empty_payload() {
        let packet = RoutedPacket {
            payload: vec![],
            ..make_packet()
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), PACKET_HEADER_LEN);

        let decoded = RoutedPacket::decode(&bytes).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_node_id_padding_stripped() {
        let field = encode_node_id("short").unwrap();
        assert_eq!(field.len(), NODE_ID_LEN);
        assert_eq!(decode_node_id(&field), "short");
    }

    #[test]
    fn test_node_id_too_long() {
        let long = "x".repeat(NODE_ID_LEN + 1);
        assert!(matches!(
            encode_node_id(&long),
            Err(CodecError::NodeIdTooLong(33))
        ));
    }

    #[test]
    fn test_full_width_node_id() {
        let id = "y".repeat(NODE_ID_LEN);
        let field = encode_node_id(&id).unwrap();
        assert_eq!(decode_node_id(&field), id);
    }
}
