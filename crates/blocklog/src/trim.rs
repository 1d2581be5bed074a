//! Offline trimming: dropping blocks from the front or the end of a pair.
//!
//! Trim-end is a pair of truncations. Trim-front has to rebuild the file:
//! every entry's trailing position is absolute, so the kept bytes are copied
//! under a fresh preamble and the whole trailer chain is rewritten, shifted
//! down by the number of trimmed bytes, while a matching index is emitted.

use memmap2::MmapMut;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::archive::LogArchive;
use crate::data::ReversePositionIter;
use crate::error::{BlockLogError, Result};
use crate::index::IndexBuilder;
use crate::preamble::{
    ChainContext, Preamble, GENESIS_OR_CHAIN_ID_VERSION, MAX_SUPPORTED_VERSION,
    PREAMBLE_NBYTES_WITH_CHAIN_ID, PRUNED_TRANSACTION_VERSION,
};
use crate::{INDEX_FILENAME, LOG_FILENAME};

/// Rewrites the pair in `block_dir` to start at `first_kept_block`,
/// staging the new files in `temp_dir`. Returns `false` (without touching
/// anything) when the target is outside the log's range.
pub fn trim_front(block_dir: &Path, temp_dir: &Path, first_kept_block: u32) -> Result<bool> {
    if block_dir == temp_dir {
        return Err(BlockLogError::BadEntry(
            "block_dir and temp_dir must be different directories".to_string(),
        ));
    }
    info!(
        "in directory '{}' trimming all blocks before block {}",
        block_dir.display(),
        first_kept_block
    );

    let archive = LogArchive::open(block_dir)?;

    if first_kept_block <= archive.data.first_block_num() {
        debug!("no blocks before block {}, nothing to do", first_kept_block);
        return Ok(false);
    }
    if first_kept_block > archive.data.last_block_num()? {
        debug!(
            "all blocks are before block {}, nothing to do (trim-front would delete the entire log)",
            first_kept_block
        );
        return Ok(false);
    }

    fs::create_dir_all(temp_dir)?;
    let new_log_path = temp_dir.join(LOG_FILENAME);
    let new_index_path = temp_dir.join(INDEX_FILENAME);

    let preamble_size = PREAMBLE_NBYTES_WITH_CHAIN_ID;
    let num_blocks_to_trim = (first_kept_block - archive.data.first_block_num()) as u64;
    let first_kept_pos = archive.index.nth_block_position(num_blocks_to_trim)?;
    let nbytes_to_trim = first_kept_pos - preamble_size;
    let new_size = archive.data.size() - nbytes_to_trim;

    let new_log_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(&new_log_path)?;
    new_log_file.set_len(new_size)?;
    // Safety: the file was just created and is owned by this function.
    let mut map = unsafe { MmapMut::map_mut(&new_log_file)? };

    // Pre-v4 entries cannot be re-framed, so the trimmed log keeps the
    // highest pre-v4 version; otherwise it upgrades to the current one.
    let preamble = Preamble {
        version: if archive.data.version() < PRUNED_TRANSACTION_VERSION {
            GENESIS_OR_CHAIN_ID_VERSION
        } else {
            MAX_SUPPORTED_VERSION
        },
        first_block_num: first_kept_block,
        context: ChainContext::Id(archive.data.chain_id()),
    };
    {
        let mut w = &mut map[..];
        preamble.write_to(&mut w)?;
    }
    map[preamble_size as usize..]
        .copy_from_slice(&archive.data.data()[first_kept_pos as usize..]);

    // Walk the copied trailer chain back to front, shifting every position
    // down and mirroring it into the fresh index.
    let num_blocks_kept = (archive.index.num_blocks() - num_blocks_to_trim) as u32;
    let mut index = IndexBuilder::create(&new_index_path, num_blocks_kept)?;
    let mut iter = ReversePositionIter::new(&mut map[..], preamble_size);
    while let Some(old_pos) = iter.value() {
        let new_pos = old_pos - nbytes_to_trim;
        index.write(new_pos)?;
        iter.set_value(new_pos);
        iter.advance()?;
    }
    index.finish()?;
    map.flush()?;
    drop(map);

    // swap the new pair into place, parking the originals in temp_dir
    fs::rename(&archive.log_path, temp_dir.join("old.log"))?;
    fs::rename(&new_log_path, &archive.log_path)?;
    fs::rename(&archive.index_path, temp_dir.join("old.index"))?;
    fs::rename(&new_index_path, &archive.index_path)?;

    Ok(true)
}

/// Truncates the pair in `block_dir` so `last_kept_block` is the final
/// block. Returns `false` (without touching anything) when the target is
/// outside the log's range or already the last block.
pub fn trim_end(block_dir: &Path, last_kept_block: u32) -> Result<bool> {
    let archive = LogArchive::open(block_dir)?;
    info!(
        "in directory '{}' trimming all blocks after block {}",
        block_dir.display(),
        last_kept_block
    );

    if last_kept_block < archive.data.first_block_num() {
        debug!(
            "all blocks are after block {}, nothing to do (trim-end would delete the entire log)",
            last_kept_block
        );
        return Ok(false);
    }
    if last_kept_block >= archive.data.last_block_num()? {
        debug!("no blocks after block {}, nothing to do", last_kept_block);
        return Ok(false);
    }

    let first_trimmed = (last_kept_block + 1 - archive.data.first_block_num()) as u64;
    let log_size = archive.index.nth_block_position(first_trimmed)?;
    let index_size = first_trimmed * 8;

    let log_path = archive.log_path.clone();
    let index_path = archive.index_path.clone();
    drop(archive);

    OpenOptions::new().write(true).open(&log_path)?.set_len(log_size)?;
    OpenOptions::new()
        .write(true)
        .open(&index_path)?
        .set_len(index_size)?;

    info!(
        "blocks.log trimmed to {} bytes, blocks.index to {} bytes",
        log_size, index_size
    );
    Ok(true)
}
