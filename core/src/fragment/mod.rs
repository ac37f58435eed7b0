//! Fragmentation and loss recovery for payloads exceeding transport MTU.
//!
//! - [`Fragment`]: 17-byte-header chunk format with per-chunk CRC32
//! - [`Fragmenter`]: splits a payload into MTU-bounded chunks
//! - [`fec`]: XOR single-erasure parity generation and recovery
//! - [`Assembler`]: merges chunks back, recovering one lost chunk when
//!   a parity chunk is held
//!
//! There is no ack channel at this layer: CRC failures and
//! unrecoverable losses are counted and dropped, never retransmitted.

pub mod assembler;
pub mod fec;
pub mod fragmenter;

pub use assembler::Assembler;
pub use fragmenter::{Fragment, Fragmenter, FRAGMENT_HEADER_LEN};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("mtu {0} leaves no room for the {FRAGMENT_HEADER_LEN}-byte header")]
    MtuTooSmall(usize),

    #[error("cannot fragment an empty payload")]
    EmptyPayload,

    #[error("payload needs {0} chunks, more than a u16 can index")]
    TooManyChunks(usize),

    #[error("buffer too short: need {need} bytes, got {got}")]
    BufferTooShort { need: usize, got: usize },
}
