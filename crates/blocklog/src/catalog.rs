//! The catalog of archived log segments.
//!
//! Every split renames the live pair to `blocks-{first}-{last}.{log,index}`
//! and registers it here. The catalog keeps an ordered map from a segment's
//! first block number to its range and filename base, plus a lazily opened
//! "active" segment whose memory maps serve reads until a lookup leaves its
//! range. When retention is exceeded the oldest segments are moved to the
//! archive directory, or deleted if none is configured.

use chain::{Block, BlockId, ChainId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::data::LogData;
use crate::entry;
use crate::error::{BlockLogError, Result};
use crate::index::{construct_index, LogIndex};

struct SegmentInfo {
    last_block_num: u32,
    /// Full path without the `.log`/`.index` extension.
    filename_base: PathBuf,
}

struct ActiveSegment {
    first_block_num: u32,
    data: LogData,
    index: LogIndex,
}

pub(crate) struct Catalog {
    archive_dir: Option<PathBuf>,
    max_retained_files: u16,
    collection: BTreeMap<u32, SegmentInfo>,
    /// First block number of the segment whose maps are currently open.
    active: Option<ActiveSegment>,
    chain_id: Option<ChainId>,
}

/// Parses `blocks-{first}-{last}.log` file names; anything else is not a
/// segment log (including the forensic `blocks-bad-tail-*.log` files).
pub(crate) fn parse_segment_log_name(name: &str) -> Option<(u32, u32)> {
    let stem = name.strip_prefix("blocks-")?.strip_suffix(".log")?;
    let (first, last) = stem.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

impl Catalog {
    pub fn new(archive_dir: Option<PathBuf>, max_retained_files: u16) -> Self {
        Self {
            archive_dir,
            max_retained_files,
            collection: BTreeMap::new(),
            active: None,
            chain_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    /// First block number covered by any retained segment.
    pub fn first_block_num(&self) -> Option<u32> {
        self.collection.keys().next().copied()
    }

    /// Scans `block_dir` for archived segment pairs and registers them.
    ///
    /// All segments must agree on the chain id (first one opened wins). A
    /// missing or stale sidecar index is rebuilt on the spot. If two
    /// segments start at the same block, the one reaching further wins.
    pub fn open(&mut self, block_dir: &Path) -> Result<()> {
        for dir_entry in fs::read_dir(block_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if parse_segment_log_name(name).is_none() {
                continue;
            }

            let log_path = dir_entry.path();
            let index_path = log_path.with_extension("index");
            let filename_base = log_path.with_extension("");

            let log = LogData::open(&log_path)?;

            match self.chain_id {
                None => self.chain_id = Some(log.chain_id()),
                Some(id) if id == log.chain_id() => {}
                Some(_) => {
                    return Err(BlockLogError::ChainIdMismatch(format!(
                        "block log file '{}' has a different chain id",
                        log_path.display()
                    )))
                }
            }

            if !index_matches_data(&index_path, &log)? {
                construct_index(&log_path, &index_path)?;
            }

            let first = log.first_block_num();
            let last = log.last_block_num()?;
            if let Some(existing) = self.collection.get(&first) {
                if last <= existing.last_block_num {
                    warn!(
                        "'{}' overlaps the range of '{}.log', dropping '{}' from the catalog",
                        log_path.display(),
                        existing.filename_base.display(),
                        log_path.display()
                    );
                    continue;
                }
                warn!(
                    "'{}' overlaps the range of '{}.log', dropping '{}.log' from the catalog",
                    log_path.display(),
                    existing.filename_base.display(),
                    existing.filename_base.display()
                );
            }

            self.collection.insert(
                first,
                SegmentInfo {
                    last_block_num: last,
                    filename_base,
                },
            );
        }
        Ok(())
    }

    /// Makes the segment containing `block_num` the active one, opening its
    /// maps if needed. Returns `false` when no retained segment covers the
    /// number; any error on the way also resets the cursor and returns
    /// `false`.
    pub fn set_active(&mut self, block_num: u32) -> bool {
        if let Some(active) = &self.active {
            if active.first_block_num <= block_num {
                if let Some(info) = self.collection.get(&active.first_block_num) {
                    if block_num <= info.last_block_num {
                        return true;
                    }
                }
            }
        }

        let Some((&first, info)) = self.collection.range(..=block_num).next_back() else {
            return false;
        };
        if block_num > info.last_block_num {
            return false;
        }

        let log_path = info.filename_base.with_extension("log");
        let index_path = info.filename_base.with_extension("index");
        match (LogData::open(&log_path), LogIndex::open(&index_path)) {
            (Ok(data), Ok(index)) => {
                self.active = Some(ActiveSegment {
                    first_block_num: first,
                    data,
                    index,
                });
                true
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    "failed to open catalog segment '{}': {}",
                    info.filename_base.display(),
                    e
                );
                self.active = None;
                false
            }
        }
    }

    /// Reads a block from the archived segments, or `None` when no segment
    /// covers the number.
    pub fn read_block(&mut self, block_num: u32) -> Result<Option<Block>> {
        let Some((slice, version)) = self.entry_slice(block_num)? else {
            return Ok(None);
        };
        let mut r = slice;
        entry::read_block(&mut r, version, Some(block_num)).map(Some)
    }

    /// Reads only a block's id from the archived segments.
    pub fn read_block_id(&mut self, block_num: u32) -> Result<Option<BlockId>> {
        let Some((slice, version)) = self.entry_slice(block_num)? else {
            return Ok(None);
        };
        let mut r = slice;
        entry::read_block_id(&mut r, version, block_num).map(Some)
    }

    fn entry_slice(&mut self, block_num: u32) -> Result<Option<(&[u8], u32)>> {
        if !self.set_active(block_num) {
            return Ok(None);
        }
        let Some(active) = &self.active else {
            return Ok(None);
        };
        let nth = (block_num - active.data.first_block_num()) as u64;
        let pos = active.index.nth_block_position(nth)?;
        Ok(Some((active.data.slice_at(pos)?, active.data.version())))
    }

    /// Registers a freshly split segment, evicting the oldest ones when the
    /// retention limit is hit.
    ///
    /// `start` must exceed every key already present; the cursor bookkeeping
    /// relies on segments only ever being appended. Returns `false` when
    /// retention is disabled and the caller should discard the pair instead.
    pub fn add(&mut self, start: u32, end: u32, filename_base: PathBuf) -> Result<bool> {
        if let Some((&last_start, _)) = self.collection.last_key_value() {
            if start <= last_start {
                return Err(BlockLogError::NonMonotonicSegment {
                    start,
                    last: last_start,
                });
            }
        }

        if self.max_retained_files == 0 {
            debug!(
                "retention disabled, not keeping segment blocks {}..={}",
                start, end
            );
            return Ok(false);
        }

        let max = self.max_retained_files as usize;
        if self.collection.len() >= max {
            let to_evict = self.collection.len() - max + 1;
            let victims: Vec<u32> = self.collection.keys().take(to_evict).copied().collect();
            for first in victims {
                let Some(info) = self.collection.remove(&first) else {
                    continue;
                };
                if self
                    .active
                    .as_ref()
                    .map(|a| a.first_block_num == first)
                    .unwrap_or(false)
                {
                    self.active = None;
                }
                self.evict_files(&info.filename_base)?;
            }
        }

        self.collection.insert(
            start,
            SegmentInfo {
                last_block_num: end,
                filename_base,
            },
        );
        Ok(true)
    }

    fn evict_files(&self, filename_base: &Path) -> Result<()> {
        let log = filename_base.with_extension("log");
        let index = filename_base.with_extension("index");
        let Some(name) = filename_base.file_name() else {
            return Err(BlockLogError::BadEntry(format!(
                "segment base '{}' has no file name",
                filename_base.display()
            )));
        };
        match &self.archive_dir {
            Some(dir) => {
                let target = dir.join(name);
                fs::rename(&log, target.with_extension("log"))?;
                fs::rename(&index, target.with_extension("index"))?;
                info!(
                    "moved retired segment '{}' to '{}'",
                    filename_base.display(),
                    dir.display()
                );
            }
            None => {
                fs::remove_file(&log)?;
                fs::remove_file(&index)?;
                info!("deleted retired segment '{}'", filename_base.display());
            }
        }
        Ok(())
    }
}

/// True when the sidecar index exists and its trailing position agrees with
/// the log's last entry.
fn index_matches_data(index_path: &Path, log: &LogData) -> Result<bool> {
    let Ok(meta) = fs::metadata(index_path) else {
        return Ok(false);
    };
    let size = meta.len();
    if size % 8 != 0 || size / 8 != log.num_blocks()? as u64 {
        return Ok(false);
    }
    if size == 0 {
        return Ok(log.num_blocks()? == 0);
    }
    let index = LogIndex::open(index_path)?;
    Ok(index.back() == Some(log.last_block_position()))
}
