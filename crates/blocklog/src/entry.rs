//! Framing of a single block on disk.
//!
//! Under v4 an entry is `[size: u32][compression: u8][block + padding]`
//! followed by a trailing `u64` equal to the entry's starting byte offset.
//! `size` counts every byte of the entry including that trailer. Pre-v4
//! entries are the bare serialized block plus the trailer.
//!
//! The padding exists so `prune_transactions` can re-pack a shrunk block in
//! place without moving subsequent entries: `size` never changes, the
//! freed bytes become zero padding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chain::{Block, BlockHeader, BlockId, Compression};
use std::io::Read;

use crate::error::{BlockLogError, Result};
use crate::preamble::PRUNED_TRANSACTION_VERSION;

/// Bytes of v4 frame before the serialized block: size (4) + compression (1).
pub const V4_FRAME_SIZE: usize = 5;

/// Largest entry we will allocate while decoding. Prevents OOM on corrupt
/// size fields.
const MAX_ENTRY_BYTES: u32 = 256 * 1024 * 1024;

/// Offset from the start of an entry to the start of the serialized block.
pub fn offset_to_block_start(version: u32) -> u64 {
    if version >= PRUNED_TRANSACTION_VERSION {
        V4_FRAME_SIZE as u64
    } else {
        0
    }
}

/// The v4 frame fields of an entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    /// Total entry bytes, trailer included.
    pub size: u32,
    pub compression: Compression,
}

/// One decoded log entry.
#[derive(Debug, Clone)]
pub enum LogEntry {
    /// Pre-v4: the bare serialized block.
    Legacy(Block),
    /// v4: frame metadata plus the block.
    V4 { meta: EntryMeta, block: Block },
}

impl LogEntry {
    pub fn block(&self) -> &Block {
        match self {
            LogEntry::Legacy(block) => block,
            LogEntry::V4 { block, .. } => block,
        }
    }

    pub fn into_block(self) -> Block {
        match self {
            LogEntry::Legacy(block) => block,
            LogEntry::V4 { block, .. } => block,
        }
    }
}

/// Serializes a block into a v4 entry buffer (without the trailing position,
/// which the caller appends after learning the entry's offset).
///
/// The buffer is sized from [`Block::maximum_pruned_pack_size`] so any later
/// in-place prune fits; bytes past the serialized block stay zero.
pub fn pack_entry(block: &Block, compression: Compression) -> Result<Vec<u8>> {
    let padded_size = block.maximum_pruned_pack_size(compression);
    let mut buffer = vec![0u8; padded_size + V4_FRAME_SIZE];
    let size = (buffer.len() + 8) as u32;

    let mut w = &mut buffer[..];
    w.write_u32::<LittleEndian>(size)?;
    w.write_u8(compression.as_u8())?;
    block.pack(&mut w, compression)?;

    Ok(buffer)
}

/// Decodes one entry at the reader's current position, leaving the reader
/// just before the trailing position `u64`.
///
/// For v4 the whole padded body is consumed even when the serialized block
/// is shorter than `size` implies (post-prune padding); a `size` too small
/// to hold its own frame is rejected.
pub fn unpack_entry<R: Read>(r: &mut R, version: u32) -> Result<LogEntry> {
    if version < PRUNED_TRANSACTION_VERSION {
        return Ok(LogEntry::Legacy(Block::unpack(r, Compression::None)?));
    }

    let size = r.read_u32::<LittleEndian>()?;
    let compression = Compression::try_from(r.read_u8()?)?;
    if size > MAX_ENTRY_BYTES {
        return Err(BlockLogError::BadEntry(format!(
            "entry size {} exceeds maximum {}",
            size, MAX_ENTRY_BYTES
        )));
    }
    let body_len = (size as usize)
        .checked_sub(V4_FRAME_SIZE + 8)
        .ok_or_else(|| BlockLogError::BadEntry(format!("invalid entry size {}", size)))?;

    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;
    let block = Block::unpack(&mut &body[..], compression)?;

    Ok(LogEntry::V4 {
        meta: EntryMeta { size, compression },
        block,
    })
}

/// Reads and fully decodes the block of the entry at the reader's position.
///
/// When `expect` is given, a decoded block with any other number fails with
/// [`BlockLogError::WrongBlockNumber`].
pub fn read_block<R: Read>(r: &mut R, version: u32, expect: Option<u32>) -> Result<Block> {
    let block = unpack_entry(r, version)?.into_block();
    if let Some(expected) = expect {
        let actual = block.block_num();
        if actual != expected {
            return Err(BlockLogError::WrongBlockNumber { expected, actual });
        }
    }
    Ok(block)
}

/// Reads only the block header of the entry at the reader's position and
/// computes its id. Transactions are never deserialized.
pub fn read_block_id<R: Read>(r: &mut R, version: u32, expect: u32) -> Result<BlockId> {
    if version >= PRUNED_TRANSACTION_VERSION {
        let _size = r.read_u32::<LittleEndian>()?;
        Compression::try_from(r.read_u8()?)?;
    }
    let header = BlockHeader::unpack(r)?;
    let actual = header.block_num();
    if actual != expect {
        return Err(BlockLogError::WrongBlockNumber {
            expected: expect,
            actual,
        });
    }
    Ok(header.id())
}
