//! Chunk format and payload splitting.
//!
//! Chunk layout (big-endian):
//! ```text
//! [8] message_id
//! [2] total_chunks
//! [2] chunk_index
//! [1] is_fec flag
//! [4] crc32 over the chunk data (not the header)
//! [N] data
//! ```
//! The CRC is corruption detection for the receiver only; there is no
//! retransmission path.

use super::FragmentError;
use crc32fast::Hasher;

/// Header size: 8 + 2 + 2 + 1 + 4 bytes.
pub const FRAGMENT_HEADER_LEN: usize = 17;

/// One MTU-bounded chunk of a larger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub message_id: u64,
    pub total_chunks: u16,
    pub chunk_index: u16,
    pub is_fec: bool,
    pub crc32: u32,
    pub data: Vec<u8>,
}

impl Fragment {
    /// Build a data chunk, computing its CRC.
    pub fn new_data(message_id: u64, total_chunks: u16, chunk_index: u16, data: Vec<u8>) -> Self {
        let crc32 = checksum(&data);
        Self {
            message_id,
            total_chunks,
            chunk_index,
            is_fec: false,
            crc32,
            data,
        }
    }

    /// Build the parity chunk, flagged `is_fec` and indexed one past
    /// the last data chunk.
    pub fn new_parity(message_id: u64, total_chunks: u16, data: Vec<u8>) -> Self {
        let crc32 = checksum(&data);
        Self {
            message_id,
            total_chunks,
            chunk_index: total_chunks,
            is_fec: true,
            crc32,
            data,
        }
    }

    /// Does the stored CRC match the data?
    pub fn crc_ok(&self) -> bool {
        checksum(&self.data) == self.crc32
    }

    /// Serialize header + data.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAGMENT_HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.total_chunks.to_be_bytes());
        buf.extend_from_slice(&self.chunk_index.to_be_bytes());
        buf.push(u8::from(self.is_fec));
        buf.extend_from_slice(&self.crc32.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse header + data. The CRC is NOT verified here; the assembler
    /// checks it so corrupt chunks can be counted, not raised.
    pub fn decode(data: &[u8]) -> Result<Self, FragmentError> {
        if data.len() < FRAGMENT_HEADER_LEN {
            return Err(FragmentError::BufferTooShort {
                need: FRAGMENT_HEADER_LEN,
                got: data.len(),
            });
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[..8]);

        Ok(Self {
            message_id: u64::from_be_bytes(id_bytes),
            total_chunks: u16::from_be_bytes([data[8], data[9]]),
            chunk_index: u16::from_be_bytes([data[10], data[11]]),
            is_fec: data[12] != 0,
            crc32: u32::from_be_bytes([data[13], data[14], data[15], data[16]]),
            data: data[FRAGMENT_HEADER_LEN..].to_vec(),
        })
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Splits payloads into MTU-bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    mtu: usize,
}

impl Fragmenter {
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Chunk payload bytes each fragment can carry.
    pub fn chunk_size(&self) -> usize {
        self.mtu.saturating_sub(FRAGMENT_HEADER_LEN)
    }

    /// Split `payload` into `ceil(len / (mtu - 17))` chunks.
    pub fn fragment(&self, message_id: u64, payload: &[u8]) -> Result<Vec<Fragment>, FragmentError> {
        let chunk_size = self.chunk_size();
        if chunk_size == 0 {
            return Err(FragmentError::MtuTooSmall(self.mtu));
        }
        if payload.is_empty() {
            return Err(FragmentError::EmptyPayload);
        }

        let total = payload.len().div_ceil(chunk_size);
        if total > u16::MAX as usize {
            return Err(FragmentError::TooManyChunks(total));
        }

        let fragments = payload
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                Fragment::new_data(message_id, total as u16, index as u16, chunk.to_vec())
            })
            .collect();

        Ok(fragments)
    }
}

impl Default for Fragmenter {
    /// BLE-friendly default MTU.
    fn default() -> Self {
        Self::new(512)
    }
}
