//! Read path: lookup by block number in the live pair, falling back to the
//! catalog of archived segments, plus head tracking on open.

use byteorder::{LittleEndian, ReadBytesExt};
use chain::{Block, BlockId};
use std::io::{Seek, SeekFrom};

use crate::entry;
use crate::error::Result;
use crate::preamble::NPOS;
use crate::BlockLog;

impl BlockLog {
    /// Reads a block by number. Numbers outside every known range return
    /// `Ok(None)` rather than an error.
    pub fn read_block_by_num(&mut self, block_num: u32) -> Result<Option<Block>> {
        match self.block_pos(block_num)? {
            Some(pos) => {
                let version = self.live_version();
                self.block_file.seek(SeekFrom::Start(pos))?;
                entry::read_block(&mut self.block_file, version, Some(block_num)).map(Some)
            }
            None => self.catalog.read_block(block_num),
        }
    }

    /// Reads only a block's id by number, decoding just the entry's header.
    pub fn read_block_id_by_num(&mut self, block_num: u32) -> Result<Option<BlockId>> {
        match self.block_pos(block_num)? {
            Some(pos) => {
                let version = self.live_version();
                self.block_file.seek(SeekFrom::Start(pos))?;
                entry::read_block_id(&mut self.block_file, version, block_num).map(Some)
            }
            None => self.catalog.read_block_id(block_num),
        }
    }

    /// Position of `block_num` in the live log via the live index, or
    /// `None` when the live range does not contain it.
    pub(crate) fn block_pos(&mut self, block_num: u32) -> Result<Option<u64>> {
        let (head_num, first_block_num) = match (&self.head, &self.preamble) {
            (Some(head), Some(p)) => (head.block_num(), p.first_block_num),
            _ => return Ok(None),
        };
        if block_num < first_block_num || block_num > head_num {
            return Ok(None);
        }

        self.index_file
            .seek(SeekFrom::Start((block_num - first_block_num) as u64 * 8))?;
        Ok(Some(self.index_file.read_u64::<LittleEndian>()?))
    }

    /// Sets `head` from the live log's trailing position. A trailer equal
    /// to the sentinel means the file holds only a preamble.
    pub(crate) fn read_head(&mut self) -> Result<()> {
        self.block_file.seek(SeekFrom::End(-8))?;
        let pos = self.block_file.read_u64::<LittleEndian>()?;
        if pos != NPOS {
            let version = self.live_version();
            self.block_file.seek(SeekFrom::Start(pos))?;
            self.head = Some(entry::read_block(&mut self.block_file, version, None)?);
        }
        Ok(())
    }

    fn live_version(&self) -> u32 {
        self.preamble
            .as_ref()
            .map(|p| p.version)
            .unwrap_or(crate::preamble::MAX_SUPPORTED_VERSION)
    }
}
