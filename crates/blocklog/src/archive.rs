//! Paired read-only view over a `blocks.log`/`blocks.index` pair, and the
//! offline inspection operations built on it.

use chain::{ChainId, GenesisState};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::parse_segment_log_name;
use crate::data::LogData;
use crate::error::{BlockLogError, Result};
use crate::index::LogIndex;
use crate::{INDEX_FILENAME, LOG_FILENAME};

/// Read-only view over both halves of a log pair; opening fails unless they
/// agree on the number of blocks.
pub struct LogArchive {
    pub(crate) log_path: PathBuf,
    pub(crate) index_path: PathBuf,
    pub(crate) data: LogData,
    pub(crate) index: LogIndex,
}

impl LogArchive {
    pub fn open(block_dir: &Path) -> Result<Self> {
        let log_path = block_dir.join(LOG_FILENAME);
        let index_path = block_dir.join(INDEX_FILENAME);

        let data = LogData::open(&log_path)?;
        let index = LogIndex::open(&index_path)?;

        let log_num_blocks = data.num_blocks()?;
        let index_num_blocks = index.num_blocks();
        if log_num_blocks as u64 != index_num_blocks {
            return Err(BlockLogError::IndexMismatch(format!(
                "'{}' holds {} blocks but '{}' indexes {}",
                log_path.display(),
                log_num_blocks,
                index_path.display(),
                index_num_blocks
            )));
        }

        Ok(Self {
            log_path,
            index_path,
            data,
            index,
        })
    }
}

/// Light-validates entries at a stride through the whole pair.
///
/// `interval` of 0 picks roughly an eighth of the block count. Any framing
/// inconsistency fails with the first offending entry.
pub fn smoke_test(block_dir: &Path, interval: u32) -> Result<()> {
    let archive = LogArchive::open(block_dir)?;
    info!("blocks.log and blocks.index agree on the number of blocks");

    let num_blocks = archive.index.num_blocks();
    let interval = if interval == 0 {
        (((num_blocks + 7) >> 3) as u32).max(1)
    } else {
        interval
    };

    let mut n = 0u64;
    let mut expected_block_num = archive.data.first_block_num();
    while n < num_blocks {
        let pos = archive.index.nth_block_position(n)?;
        archive
            .data
            .light_validate_block_entry_at(pos, expected_block_num)?;
        n += interval as u64;
        expected_block_num = expected_block_num.wrapping_add(interval);
    }
    Ok(())
}

/// Extracts the genesis state embedded in the oldest log covering block 1.
///
/// After a split the live preamble only carries the chain id, so archived
/// `blocks-1-*.log` segments are preferred over the live file. Returns
/// `None` when no reachable log embeds a genesis state.
pub fn extract_genesis_state(block_dir: &Path) -> Result<Option<GenesisState>> {
    let mut path = block_dir.join(LOG_FILENAME);
    for dir_entry in fs::read_dir(block_dir)? {
        let dir_entry = dir_entry?;
        if let Some(name) = dir_entry.file_name().to_str() {
            if matches!(parse_segment_log_name(name), Some((1, _))) {
                path = dir_entry.path();
            }
        }
    }
    Ok(LogData::open(&path)?.genesis_state())
}

/// Reads the chain id from the live log's preamble.
pub fn extract_chain_id(block_dir: &Path) -> Result<ChainId> {
    Ok(LogData::open(block_dir.join(LOG_FILENAME))?.chain_id())
}

/// True when a live pair exists in `data_dir`.
pub fn exists(data_dir: &Path) -> bool {
    data_dir.join(LOG_FILENAME).exists() && data_dir.join(INDEX_FILENAME).exists()
}
