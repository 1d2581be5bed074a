//! Write path: append, reset, split-on-stride, and the in-place
//! transaction prune.
//!
//! Write order for an append is load-bearing for crash recovery: entry
//! bytes, then the log trailer, then the index position, then flush.

use byteorder::{LittleEndian, WriteBytesExt};
use chain::{Block, ChainId, Compression, GenesisState, TxId};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

use crate::entry::{self, offset_to_block_start, LogEntry};
use crate::error::{BlockLogError, Result};
use crate::preamble::{
    ChainContext, Preamble, MAX_SUPPORTED_VERSION, PRUNED_TRANSACTION_VERSION,
};
use crate::BlockLog;

impl BlockLog {
    /// Appends a block, returning its byte offset in the live log.
    ///
    /// The block's number must be exactly one past the current index end.
    /// When the number is a multiple of the configured stride, the live
    /// pair is split off into the catalog afterwards.
    pub fn append(&mut self, block: &Block, compression: Compression) -> Result<u64> {
        let (version, first_block_num) = match &self.preamble {
            Some(p) => (p.version, p.first_block_num),
            None => return Err(BlockLogError::AppendBeforeGenesis),
        };

        let block_num = block.block_num();
        let delta = block_num
            .checked_sub(first_block_num)
            .ok_or(BlockLogError::WrongBlockNumber {
                expected: first_block_num,
                actual: block_num,
            })?;

        self.block_file.seek(SeekFrom::End(0))?;
        let index_end = self.index_file.seek(SeekFrom::End(0))?;
        let expected = delta as u64 * 8;
        if index_end != expected {
            return Err(BlockLogError::AppendPositionMismatch {
                expected,
                actual: index_end,
            });
        }

        let pos = self.write_log_entry(version, block, compression)?;
        self.head = Some(block.clone());

        if block_num as u64 % self.stride == 0 {
            self.split_log(block_num)?;
        }
        Ok(pos)
    }

    fn write_log_entry(
        &mut self,
        version: u32,
        block: &Block,
        compression: Compression,
    ) -> Result<u64> {
        let pos = self.block_file.stream_position()?;

        let buffer = if version >= PRUNED_TRANSACTION_VERSION {
            entry::pack_entry(block, compression)?
        } else {
            if compression != Compression::None {
                return Err(BlockLogError::LegacyCompressionRejected(version));
            }
            let mut buf = Vec::with_capacity(block.packed_size());
            block.pack(&mut buf, compression)?;
            buf
        };

        self.block_file.write_all(&buffer)?;
        self.block_file.write_u64::<LittleEndian>(pos)?;
        self.index_file.write_u64::<LittleEndian>(pos)?;
        self.flush()?;
        Ok(pos)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.block_file.sync_data()?;
        self.index_file.sync_data()?;
        Ok(())
    }

    /// Closes out the live pair as an archived segment and starts a fresh
    /// one whose preamble continues at `head + 1` with a chain-id context.
    fn split_log(&mut self, head_num: u32) -> Result<()> {
        let (first_block_num, chain_id) = match &self.preamble {
            Some(p) => (p.first_block_num, p.chain_id()),
            None => return Err(BlockLogError::AppendBeforeGenesis),
        };

        let filename_base = self
            .data_dir
            .join(format!("blocks-{}-{}", first_block_num, head_num));
        let retained = self
            .catalog
            .add(first_block_num, head_num, filename_base.clone())?;

        let log_target = filename_base.with_extension("log");
        let index_target = filename_base.with_extension("index");
        std::fs::rename(&self.log_path, &log_target)?;
        std::fs::rename(&self.index_path, &index_target)?;
        if !retained {
            std::fs::remove_file(&log_target)?;
            std::fs::remove_file(&index_target)?;
            debug!("dropped split-off segment '{}'", filename_base.display());
        }

        self.reset_files(Preamble {
            version: MAX_SUPPORTED_VERSION,
            first_block_num: head_num + 1,
            context: ChainContext::Id(chain_id),
        })
    }

    /// Initializes the log at block 1 with an embedded genesis state and
    /// appends the first block.
    pub fn reset_with_genesis(
        &mut self,
        genesis: GenesisState,
        first_block: &Block,
        compression: Compression,
    ) -> Result<u64> {
        self.head = None;
        self.reset_files(Preamble {
            version: MAX_SUPPORTED_VERSION,
            first_block_num: 1,
            context: ChainContext::Genesis(genesis),
        })?;
        self.append(first_block, compression)
    }

    /// Initializes an empty log starting past genesis; only the chain id is
    /// recorded. `first_block_num` must be greater than 1 (a log covering
    /// block 1 must embed the genesis state instead).
    pub fn reset_with_chain_id(&mut self, chain_id: ChainId, first_block_num: u32) -> Result<()> {
        if first_block_num <= 1 {
            return Err(BlockLogError::BadPreamble(
                "a log starting at block 1 must be created with a genesis state".to_string(),
            ));
        }
        if let Some(catalog_id) = self.catalog.chain_id() {
            if catalog_id != chain_id {
                return Err(BlockLogError::ChainIdMismatch(
                    "cannot reset the log to a different chain".to_string(),
                ));
            }
        }
        self.head = None;
        self.reset_files(Preamble {
            version: MAX_SUPPORTED_VERSION,
            first_block_num,
            context: ChainContext::Id(chain_id),
        })
    }

    /// Truncates both live files and writes a fresh preamble.
    fn reset_files(&mut self, preamble: Preamble) -> Result<()> {
        self.block_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.log_path)?;
        self.index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.index_path)?;

        preamble.write_to(&mut self.block_file)?;
        self.flush()?;
        self.preamble = Some(preamble);
        Ok(())
    }

    /// Prunes the payloads of the given transactions inside the stored
    /// entry of `block_num`, re-packing the block into the entry's existing
    /// byte budget (the freed bytes become padding; `entry.size` never
    /// changes). Matched ids are removed from `ids`. Returns the number of
    /// transactions pruned.
    ///
    /// Only v4 entries carry the frame that makes this rewrite possible.
    pub fn prune_transactions(&mut self, block_num: u32, ids: &mut Vec<TxId>) -> Result<usize> {
        let version = match &self.preamble {
            Some(p) => p.version,
            None => return Err(BlockLogError::AppendBeforeGenesis),
        };
        if version < PRUNED_TRANSACTION_VERSION {
            return Err(BlockLogError::UnsupportedVersion {
                version,
                min: PRUNED_TRANSACTION_VERSION,
                max: MAX_SUPPORTED_VERSION,
            });
        }

        let pos = self
            .block_pos(block_num)?
            .ok_or(BlockLogError::NotFound(block_num))?;
        self.block_file.seek(SeekFrom::Start(pos))?;
        let (meta, mut block) = match entry::unpack_entry(&mut self.block_file, version)? {
            LogEntry::V4 { meta, block } => (meta, block),
            LogEntry::Legacy(_) => unreachable!("v4 log produced a legacy entry"),
        };
        if block.block_num() != block_num {
            return Err(BlockLogError::WrongBlockNumber {
                expected: block_num,
                actual: block.block_num(),
            });
        }

        let mut num_pruned = 0;
        for tx in &mut block.transactions {
            if tx.is_pruned() {
                continue;
            }
            if let Some(i) = ids.iter().position(|id| *id == tx.id) {
                tx.prune();
                ids.remove(i);
                num_pruned += 1;
            }
        }

        if num_pruned > 0 {
            // rewrite only the block body, not the frame or trailer
            let block_offset = offset_to_block_start(version);
            let budget = meta.size as usize - block_offset as usize - 8;
            if block.packed_size() > budget {
                return Err(BlockLogError::BadEntry(format!(
                    "pruned block {} does not fit its entry budget",
                    block_num
                )));
            }
            let mut buffer = vec![0u8; budget];
            let mut w = &mut buffer[..];
            block.pack(&mut w, meta.compression)?;

            self.block_file.seek(SeekFrom::Start(pos + block_offset))?;
            self.block_file.write_all(&buffer)?;
            self.block_file.sync_data()?;
        }
        Ok(num_pruned)
    }
}
