//! # Chain — Ledgerstream value types
//!
//! The value objects shared by the storage and consensus layers: blocks,
//! block ids, transactions, the genesis state, and the chain id derived from
//! it. Everything here knows how to serialize itself into the fixed binary
//! layout the block log depends on; the storage engine treats these types as
//! opaque values that carry their own framing.
//!
//! ## Binary layout contract
//!
//! The block header is packed to exactly [`BlockHeader::PACKED_SIZE`] bytes
//! with the `previous` block id starting at byte offset
//! [`PREV_BLOCK_ID_OFFSET`]. The first four bytes of every [`BlockId`] are
//! the **big-endian** block number of the block it names. Together these two
//! facts let a reader derive an entry's block number from 4 bytes without
//! deserializing the block; the block log leans on this for index
//! reconstruction and light validation. Do not reorder header fields.

mod block;
mod genesis;
mod transaction;

pub use block::{Block, BlockHeader, BlockId, PREV_BLOCK_ID_OFFSET};
pub use genesis::{ChainId, GenesisState};
pub use transaction::{Transaction, TxId};

use thiserror::Error;

/// Maximum transaction payload we will allocate during decode (10 MiB).
/// Prevents OOM on corrupt input.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Maximum transaction count we will accept in one block during decode.
pub const MAX_TRANSACTIONS: usize = 1_000_000;
/// Maximum genesis network-name length (bytes).
pub const MAX_NAME_BYTES: usize = 4 * 1024;

/// Errors raised while packing or unpacking chain value types.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An underlying I/O error (including short reads on truncated input).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A compression tag byte that does not name a known [`Compression`].
    #[error("unknown compression tag {0}")]
    UnknownCompression(u8),

    /// A length prefix exceeding the sanity cap for its field.
    #[error("{field} length {len} exceeds maximum {max}")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A transaction status byte that is neither full nor pruned.
    #[error("unknown transaction status {0}")]
    UnknownTxStatus(u8),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Compression applied to a serialized block inside a log entry.
///
/// Only `None` exists today; the tag is carried on the wire as a `u8` so the
/// format can grow without changing entry framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
}

impl Compression {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Compression {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Compression::None),
            other => Err(CodecError::UnknownCompression(other)),
        }
    }
}

#[cfg(test)]
mod tests;
