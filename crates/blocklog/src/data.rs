//! Read-only memory-mapped view over a `blocks.log` file.
//!
//! `LogData` parses the preamble once on open and then exposes
//! bounds-checked reads over the raw bytes. It never mutates the file; the
//! engine holds its own read/write handle for the live pair, and offline
//! operations reopen files as needed.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chain::{BlockId, ChainId, GenesisState, PREV_BLOCK_ID_OFFSET};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::entry::{self, offset_to_block_start};
use crate::error::{BlockLogError, Result};
use crate::preamble::{Preamble, PRUNED_TRANSACTION_VERSION};

pub struct LogData {
    path: PathBuf,
    map: Mmap,
    preamble: Preamble,
    first_block_pos: u64,
}

/// Outcome details of [`LogData::full_validate_block_entry`].
pub(crate) struct ValidatedEntry {
    pub block_num: u32,
    pub id: BlockId,
    /// Byte offset of the next entry (past this entry's trailer).
    pub next_pos: u64,
}

/// Why full validation stopped. The distinction matters to `repair_log`:
/// an undecodable block gets its bytes written out for forensics, any other
/// failure just ends the walk.
pub(crate) enum ValidateFailure {
    /// The entry's block could not be deserialized.
    BadBlock(BlockLogError),
    /// The block decoded but the entry's trailing position does not point
    /// back at the entry.
    BadTrailer { block_num: u32 },
}

impl LogData {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: the maps are read-only and the single-writer model keeps
        // writers off files that have live read-only views.
        let map = unsafe { Mmap::map(&file)? };

        let mut r = &map[..];
        let preamble = Preamble::read_from(&mut r)?;
        let first_block_pos = (map.len() - r.len()) as u64;

        Ok(Self {
            path,
            map,
            preamble,
            first_block_pos,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.map
    }

    pub fn size(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    pub fn version(&self) -> u32 {
        self.preamble.version
    }

    pub fn first_block_num(&self) -> u32 {
        self.preamble.first_block_num
    }

    pub fn chain_id(&self) -> ChainId {
        self.preamble.chain_id()
    }

    pub fn genesis_state(&self) -> Option<GenesisState> {
        self.preamble.genesis_state().cloned()
    }

    /// Byte offset of the first entry (end of the preamble).
    pub fn first_block_position(&self) -> u64 {
        self.first_block_pos
    }

    /// The trailing `u64` of the file. For a log with entries this is the
    /// last entry's offset; for a preamble-only file it is the sentinel.
    pub fn last_block_position(&self) -> u64 {
        LittleEndian::read_u64(&self.map[self.map.len() - 8..])
    }

    pub fn last_block_num(&self) -> Result<u32> {
        self.block_num_at(self.last_block_position())
    }

    pub fn num_blocks(&self) -> Result<u32> {
        if self.first_block_pos == self.size() {
            return Ok(0);
        }
        Ok(self.last_block_num()? - self.first_block_num() + 1)
    }

    /// Bounds-checked slice starting at `pos`.
    pub fn slice_at(&self, pos: u64) -> Result<&[u8]> {
        if pos > self.size() {
            return Err(BlockLogError::BadEntry(format!(
                "position {} is past the end of the log ({} bytes)",
                pos,
                self.size()
            )));
        }
        Ok(&self.map[pos as usize..])
    }

    fn u32_at(&self, pos: u64) -> Result<u32> {
        let s = self.slice_at(pos)?;
        if s.len() < 4 {
            return Err(BlockLogError::BadEntry(format!(
                "cannot read 4 bytes at position {}",
                pos
            )));
        }
        Ok(LittleEndian::read_u32(s))
    }

    fn u64_at(&self, pos: u64) -> Result<u64> {
        let s = self.slice_at(pos)?;
        if s.len() < 8 {
            return Err(BlockLogError::BadEntry(format!(
                "cannot read 8 bytes at position {}",
                pos
            )));
        }
        Ok(LittleEndian::read_u64(s))
    }

    /// Derives the block number of the entry at `pos` without parsing it:
    /// skip the frame prefix, skip 14 bytes into the header, read the
    /// big-endian number embedded in the `previous` id, add one.
    pub fn block_num_at(&self, pos: u64) -> Result<u32> {
        let offset = pos + offset_to_block_start(self.version()) + PREV_BLOCK_ID_OFFSET as u64;
        let s = self.slice_at(offset)?;
        if s.len() < 4 {
            return Err(BlockLogError::BadEntry(format!(
                "entry at position {} is truncated",
                pos
            )));
        }
        Ok(BigEndian::read_u32(s) + 1)
    }

    /// Validates the entry at `pos` without deserializing its block: the
    /// derived block number must match, and for v4 the trailing `u64` at
    /// `pos + size - 8` must equal `pos`.
    pub fn light_validate_block_entry_at(&self, pos: u64, expected_block_num: u32) -> Result<()> {
        let actual = self.block_num_at(pos)?;
        if actual != expected_block_num {
            return Err(BlockLogError::BadEntry(format!(
                "at position {} expected block number {} but found {}",
                pos, expected_block_num, actual
            )));
        }

        if self.version() >= PRUNED_TRANSACTION_VERSION {
            let entry_size = self.u32_at(pos)?;
            let trailer_pos = pos
                .checked_add(entry_size as u64)
                .and_then(|end| end.checked_sub(8))
                .ok_or_else(|| {
                    BlockLogError::BadEntry(format!("bad entry size {} at {}", entry_size, pos))
                })?;
            let entry_position = self.u64_at(trailer_pos)?;
            if entry_position != pos {
                return Err(BlockLogError::BadEntry(format!(
                    "the last 8 bytes of the entry for block {} do not contain its own position",
                    actual
                )));
            }
        }
        Ok(())
    }

    /// Validates the entry at `pos` by fully deserializing its block.
    ///
    /// Continuity breaks (skipped numbers, broken previous-links) are logged
    /// as warnings but do not fail the entry; only an undecodable block or a
    /// wrong trailing position does.
    pub(crate) fn full_validate_block_entry(
        &self,
        pos: u64,
        previous_block_num: u32,
        previous_block_id: &BlockId,
    ) -> std::result::Result<ValidatedEntry, ValidateFailure> {
        let slice = self.slice_at(pos).map_err(ValidateFailure::BadBlock)?;
        let mut r = slice;
        let entry = entry::unpack_entry(&mut r, self.version()).map_err(ValidateFailure::BadBlock)?;

        let block = entry.block();
        let block_num = block.block_num();
        let id = block.id();

        if block_num != previous_block_num + 1 {
            warn!(
                "block {} skips blocks, previous block in the log is {}",
                block_num, previous_block_num
            );
        }
        if !previous_block_id.is_zero() && *previous_block_id != block.header.previous {
            warn!(
                "block {} does not link back to the previous block: expected {}, found {}",
                block_num, previous_block_id, block.header.previous
            );
        }

        let consumed = (slice.len() - r.len()) as u64;
        if r.len() < 8 {
            return Err(ValidateFailure::BadTrailer { block_num });
        }
        let trailer = LittleEndian::read_u64(r);
        if trailer != pos {
            return Err(ValidateFailure::BadTrailer { block_num });
        }

        Ok(ValidatedEntry {
            block_num,
            id,
            next_pos: pos + consumed + 8,
        })
    }
}

/// Walks the chain of trailing entry positions backwards through a log's
/// bytes: each entry's trailer holds its own starting offset, so reading the
/// trailer and stepping 8 bytes before it lands on the previous entry's
/// trailer.
///
/// Generic over the byte storage so the same walk serves read-only maps
/// (index reconstruction) and writable ones (trim-front position rewriting).
pub(crate) struct ReversePositionIter<D> {
    data: D,
    /// One trailer-width before the first entry; walking at or past this
    /// position terminates the iteration.
    begin_position: u64,
    current_position: u64,
}

impl<D: AsRef<[u8]>> ReversePositionIter<D> {
    /// `first_block_pos` is the offset of the first entry (the preamble
    /// size of the file the bytes came from).
    pub fn new(data: D, first_block_pos: u64) -> Self {
        let len = data.as_ref().len() as u64;
        Self {
            data,
            begin_position: first_block_pos - 8,
            current_position: len - 8,
        }
    }

    /// The position stored in the trailer under the cursor, or `None` once
    /// the walk has passed the first entry.
    pub fn value(&self) -> Option<u64> {
        if self.current_position <= self.begin_position {
            return None;
        }
        let s = &self.data.as_ref()[self.current_position as usize..];
        Some(LittleEndian::read_u64(s))
    }

    /// Steps to the previous entry's trailer.
    pub fn advance(&mut self) -> Result<()> {
        let value = self.value().ok_or_else(|| {
            BlockLogError::BadEntry("reverse position walk advanced past the first entry".into())
        })?;
        let len = self.data.as_ref().len() as u64;
        let next = value.checked_sub(8).ok_or_else(|| {
            BlockLogError::BadEntry(format!("bad trailing position value {}", value))
        })?;
        if next > len - 8 {
            return Err(BlockLogError::BadEntry(format!(
                "trailing position value {} is not in the range ({},{})",
                value, self.begin_position, len
            )));
        }
        self.current_position = next;
        Ok(())
    }
}

impl<D: AsRef<[u8]> + AsMut<[u8]>> ReversePositionIter<D> {
    /// Overwrites the trailer under the cursor.
    pub fn set_value(&mut self, pos: u64) {
        let at = self.current_position as usize;
        LittleEndian::write_u64(&mut self.data.as_mut()[at..at + 8], pos);
    }
}
