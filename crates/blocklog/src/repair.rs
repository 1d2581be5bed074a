//! Offline repair of a damaged log.
//!
//! The whole data directory is moved aside as a timestamped backup, then
//! the backup's log is streamed from the start with full validation and the
//! longest decodable prefix is copied into a fresh `blocks.log`. The index
//! is not rebuilt here; the next engine open does that.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::{LogData, ValidateFailure};
use crate::error::{BlockLogError, Result};
use crate::LOG_FILENAME;

/// Rewrites the log in `data_dir` up to its last valid entry.
///
/// `truncate_at_block` (when nonzero) stops the walk early, keeping only
/// blocks up to that number. When an entry fails to *decode*, the remaining
/// bytes are written out as `blocks-bad-tail-{timestamp}.log` for
/// forensics; any other validation failure just ends the walk. Returns the
/// backup directory the original data was moved to.
pub fn repair_log(data_dir: &Path, truncate_at_block: Option<u32>) -> Result<PathBuf> {
    info!("recovering block log in '{}'", data_dir.display());
    if !data_dir.is_dir() || !data_dir.join(LOG_FILENAME).is_file() {
        return Err(BlockLogError::LogNotFound(data_dir.to_path_buf()));
    }

    let truncate_at_block = match truncate_at_block {
        Some(0) | None => u32::MAX,
        Some(n) => n,
    };
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();

    let blocks_dir = data_dir.canonicalize()?;
    let dir_name = blocks_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BlockLogError::LogNotFound(blocks_dir.clone()))?;
    let backup_dir = match blocks_dir.parent() {
        Some(parent) => parent.join(format!("{}-{}", dir_name, stamp)),
        None => return Err(BlockLogError::LogNotFound(blocks_dir.clone())),
    };
    if backup_dir.exists() {
        return Err(BlockLogError::BackupDirExists(backup_dir));
    }

    fs::rename(&blocks_dir, &backup_dir)?;
    info!(
        "moved existing blocks directory to backup location '{}'",
        backup_dir.display()
    );
    fs::create_dir_all(&blocks_dir)?;

    let log_data = LogData::open(backup_dir.join(LOG_FILENAME))?;
    let mut pos = log_data.first_block_position();
    let mut block_num = log_data.first_block_num() - 1;
    let mut block_id = chain::BlockId::default();
    let mut error_msg: Option<String> = None;

    while pos < log_data.size() && block_num < truncate_at_block {
        match log_data.full_validate_block_entry(pos, block_num, &block_id) {
            Ok(validated) => {
                block_num = validated.block_num;
                block_id = validated.id;
                pos = validated.next_pos;
                if block_num % 1000 == 0 {
                    info!("verified block {}", block_num);
                }
            }
            Err(ValidateFailure::BadBlock(e)) => {
                write_incomplete_block_data(&blocks_dir, &stamp, block_num, &log_data, pos)?;
                error_msg = Some(e.to_string());
                break;
            }
            Err(ValidateFailure::BadTrailer { block_num: bad }) => {
                error_msg = Some(format!(
                    "the trailing block position of block {} is incorrect",
                    bad
                ));
                break;
            }
        }
    }

    let new_log_path = blocks_dir.join(LOG_FILENAME);
    fs::write(&new_log_path, &log_data.data()[..pos as usize])?;

    match &error_msg {
        Some(msg) => info!(
            "recovered only up to block {}; block {} could not be restored: {}",
            block_num,
            block_num + 1,
            msg
        ),
        None if block_num == truncate_at_block && pos < log_data.size() => info!(
            "stopped recovery early at the requested block {}",
            truncate_at_block
        ),
        None => info!(
            "existing block log was undamaged, recovered all irreversible blocks up to block {}",
            block_num
        ),
    }

    Ok(backup_dir)
}

/// Writes the undecodable tail out next to the repaired log so the bytes of
/// the torn block are not lost.
fn write_incomplete_block_data(
    blocks_dir: &Path,
    stamp: &str,
    block_num: u32,
    log_data: &LogData,
    pos: u64,
) -> Result<()> {
    let tail_path = blocks_dir.join(format!("blocks-bad-tail-{}.log", stamp));
    fs::write(&tail_path, &log_data.data()[pos as usize..])?;
    warn!(
        "data at the tail of the block log, which should contain the (incomplete) \
         serialization of block {}, has been written out to '{}'",
        block_num + 1,
        tail_path.display()
    );
    Ok(())
}
