//! The sidecar index: a dense little-endian array of `u64` entry positions,
//! one per block. `index[i]` is the byte offset in the log of block
//! `first_block_num + i`.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::info;

use crate::data::{LogData, ReversePositionIter};
use crate::error::{BlockLogError, Result};

/// Read-only memory-mapped view over a `blocks.index` file.
pub struct LogIndex {
    map: Mmap,
}

impl LogIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        // Safety: read-only map under the single-writer model.
        let map = unsafe { Mmap::map(&file)? };
        if map.len() % 8 != 0 {
            return Err(BlockLogError::IndexMismatch(format!(
                "the size of '{}' is not a multiple of 8",
                path.display()
            )));
        }
        Ok(Self { map })
    }

    pub fn num_blocks(&self) -> u64 {
        (self.map.len() / 8) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Position of the last entry, or `None` for an empty index.
    pub fn back(&self) -> Option<u64> {
        if self.map.is_empty() {
            return None;
        }
        Some(LittleEndian::read_u64(&self.map[self.map.len() - 8..]))
    }

    /// Position of the `n`th indexed block (0-based).
    pub fn nth_block_position(&self, n: u64) -> Result<u64> {
        if n >= self.num_blocks() {
            return Err(BlockLogError::IndexMismatch(format!(
                "index entry {} requested but the index only holds {}",
                n,
                self.num_blocks()
            )));
        }
        let at = (n * 8) as usize;
        Ok(LittleEndian::read_u64(&self.map[at..at + 8]))
    }
}

/// Writes a fresh index file back to front.
///
/// The file is pre-sized to `num_blocks * 8` and filled from the end,
/// matching the order positions come out of a reverse walk over the log.
pub struct IndexBuilder {
    // None only for a zero-block index (an empty file cannot be mapped).
    map: Option<MmapMut>,
    current_offset: usize,
}

impl IndexBuilder {
    pub fn create<P: AsRef<Path>>(path: P, num_blocks: u32) -> Result<Self> {
        let size = num_blocks as u64 * 8;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;

        let map = if size == 0 {
            None
        } else {
            // Safety: we own the file for the builder's lifetime.
            Some(unsafe { MmapMut::map_mut(&file)? })
        };
        Ok(Self {
            map,
            current_offset: size as usize,
        })
    }

    /// Appends a position at the front of the unwritten region.
    pub fn write(&mut self, pos: u64) -> Result<()> {
        let map = self.map.as_mut().ok_or_else(|| {
            BlockLogError::IndexMismatch("more index entries than blocks".to_string())
        })?;
        if self.current_offset < 8 {
            return Err(BlockLogError::IndexMismatch(
                "more index entries than blocks".to_string(),
            ));
        }
        self.current_offset -= 8;
        LittleEndian::write_u64(&mut map[self.current_offset..self.current_offset + 8], pos);
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}

/// Rebuilds `index_path` from scratch by walking `log_path`'s chain of
/// trailing entry positions back from the end of the file.
///
/// Fails if the walk does not yield exactly the number of blocks the log
/// claims to hold.
pub fn construct_index<P: AsRef<Path>, Q: AsRef<Path>>(log_path: P, index_path: Q) -> Result<()> {
    let log_path = log_path.as_ref();
    let index_path = index_path.as_ref();
    info!(
        "reconstructing '{}' from '{}'",
        index_path.display(),
        log_path.display()
    );

    let log_data = LogData::open(log_path)?;
    let num_blocks = log_data.num_blocks()?;
    info!(
        "block log version {}, first block {}, {} blocks",
        log_data.version(),
        log_data.first_block_num(),
        num_blocks
    );

    let mut builder = IndexBuilder::create(index_path, num_blocks)?;
    if num_blocks == 0 {
        return builder.finish();
    }

    let mut blocks_found = 0u32;
    let mut iter = ReversePositionIter::new(log_data.data(), log_data.first_block_position());
    while let Some(pos) = iter.value() {
        if blocks_found == num_blocks {
            break;
        }
        builder.write(pos)?;
        blocks_found += 1;
        iter.advance()?;
    }

    if blocks_found != num_blocks {
        return Err(BlockLogError::BadEntry(format!(
            "'{}' claims blocks {}..={} but the position walk found only {} entries",
            log_path.display(),
            log_data.first_block_num(),
            log_data.last_block_num()?,
            blocks_found
        )));
    }
    builder.finish()
}
