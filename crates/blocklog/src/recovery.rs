//! Open-time reconciliation of the live log/index pair.
//!
//! A crash can leave the pair in one of a few recognizable states; the
//! append path's write order (log bytes, log trailer, index position, flush)
//! guarantees it. Reconciliation restores the invariant that the index
//! mirrors the log exactly before the engine opens its writer handles.

use byteorder::{ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::data::LogData;
use crate::error::Result;
use crate::index::{construct_index, LogIndex};
use crate::preamble::{Preamble, PRUNED_TRANSACTION_VERSION};

enum Reconcile {
    Nothing,
    /// Truncate the log file to this many bytes; the index is authoritative
    /// and the log's tail write was torn.
    TrimLog(u64),
    RebuildIndex,
}

/// Brings a nonempty log and its index back into agreement. Returns the
/// log's preamble for the engine to adopt.
pub(crate) fn reconcile_on_open(log_path: &Path, index_path: &Path) -> Result<Preamble> {
    let (preamble, action) = {
        let log_data = LogData::open(log_path)?;
        let preamble = log_data.preamble().clone();
        let index_size = fs::metadata(index_path)?.len();

        let action = if index_size == 0 {
            info!("index is empty, reconstructing it from the log");
            Reconcile::RebuildIndex
        } else {
            let index = LogIndex::open(index_path)?;
            if index.back() == Some(log_data.last_block_position()) {
                Reconcile::Nothing
            } else {
                match recover_from_incomplete_block_head(&log_data, &index) {
                    Some(trimmed_size) => Reconcile::TrimLog(trimmed_size),
                    None => {
                        info!(
                            "the last block positions in log and index differ, reconstructing index"
                        );
                        Reconcile::RebuildIndex
                    }
                }
            }
        };
        (preamble, action)
    };

    // The read-only maps are dropped before the files are touched.
    match action {
        Reconcile::Nothing => {}
        Reconcile::TrimLog(trimmed_size) => {
            info!("the last block in the log is incomplete, trimming it");
            let file = fs::OpenOptions::new().write(true).open(log_path)?;
            file.set_len(trimmed_size)?;
            file.sync_data()?;
        }
        Reconcile::RebuildIndex => construct_index(log_path, index_path)?,
    }

    Ok(preamble)
}

/// Checks whether the log's tail past the last indexed entry is a torn
/// write. If the last indexed entry light-validates and the log extends
/// beyond it, the log can be truncated to `index.back() + entry_size`;
/// returns that size, or `None` when the caller should rebuild the index
/// instead.
///
/// Only v4 logs carry the entry size needed for this check.
fn recover_from_incomplete_block_head(log_data: &LogData, index: &LogIndex) -> Option<u64> {
    if log_data.version() < PRUNED_TRANSACTION_VERSION {
        return None;
    }
    let back = index.back()?;
    if log_data.size() <= back + 4 {
        return None;
    }

    let entry_size = read_entry_size(log_data, back)?;
    let trimmed_size = back + entry_size as u64;
    if log_data.size() <= trimmed_size {
        return None;
    }

    let expected_block_num = log_data.first_block_num() + index.num_blocks() as u32 - 1;
    match log_data.light_validate_block_entry_at(back, expected_block_num) {
        Ok(()) => Some(trimmed_size),
        Err(_) => None,
    }
}

fn read_entry_size(log_data: &LogData, pos: u64) -> Option<u32> {
    let slice = log_data.slice_at(pos).ok()?;
    if slice.len() < 4 {
        return None;
    }
    Some(LittleEndian::read_u32(slice))
}
