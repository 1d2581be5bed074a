//! # Blocklog — Ledgerstream irreversible block storage
//!
//! The durable, append-only record of irreversible blocks, paired with a
//! dense position index for O(1) lookup by block number.
//!
//! ## Architecture
//!
//! ```text
//! Consensus
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                   BLOCK LOG                      │
//! │                                                  │
//! │ append.rs → entry frame → blocks.log (+ trailer) │
//! │                         → blocks.index (position)│
//! │              |                                   │
//! │              |  (block_num % stride == 0?)       │
//! │              v            yes                    │
//! │           split → rename pair, register in       │
//! │                   catalog, fresh live preamble   │
//! │                                                  │
//! │ read.rs → live index/log, else catalog segment   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `BlockLog` struct, open/reconciliation, accessors    |
//! | [`preamble`] | Versioned fixed header codec                         |
//! | [`entry`]    | Per-block framing (v1–v4)                            |
//! | [`data`]     | Read-only mmap view of a log + validators            |
//! | [`index`]    | Read-only mmap view of an index + reconstruction     |
//! | `catalog`    | Archived segment collection, retention, active cursor|
//! | `append`     | Append, reset, split, in-place transaction pruning   |
//! | `read`       | Lookup by block number, head tracking                |
//! | `recovery`   | Open-time log/index reconciliation, torn-tail trim   |
//! | [`repair`]   | Offline rewrite of a damaged log                     |
//! | [`trim`]     | Offline front/end trimming                           |
//! | [`archive`]  | Paired read-only view, smoke test, extraction ops    |
//!
//! ## Crash Safety
//!
//! An append writes log bytes, then the log trailer, then the index
//! position, then flushes. Reconciliation on open recognizes every state a
//! crash can leave: an empty half is rebuilt or discarded, a torn log tail
//! behind an intact index is trimmed, anything else rebuilds the index from
//! the log's reverse position chain.
//!
//! The engine is a single writer with no internal locking; read-only views
//! are memory maps and may be consulted from other threads only while no
//! writer is running on the same files.

mod append;
mod catalog;
pub mod data;
pub mod entry;
pub mod error;
pub mod index;
pub mod preamble;
mod read;
mod recovery;
pub mod repair;
pub mod trim;

pub mod archive;

use chain::{Block, ChainId};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use catalog::Catalog;
pub use error::{BlockLogError, Result};
pub use index::construct_index;
pub use preamble::{Preamble, NPOS};
pub use repair::repair_log;
pub use trim::{trim_end, trim_front};

pub use archive::{exists, extract_chain_id, extract_genesis_state, smoke_test};

/// Name of the live log file inside the data directory.
pub const LOG_FILENAME: &str = "blocks.log";
/// Name of the live index file inside the data directory.
pub const INDEX_FILENAME: &str = "blocks.index";

/// Configuration for [`BlockLog::open`].
#[derive(Debug, Clone)]
pub struct BlockLogConfig {
    /// Directory holding the live pair and retained segments.
    pub data_dir: PathBuf,
    /// Where retired segments go; relative paths resolve against `data_dir`.
    /// `None` deletes retired segments instead.
    pub archive_dir: Option<PathBuf>,
    /// Blocks per segment; the log splits whenever the appended block's
    /// number is a multiple of this. `u64::MAX` disables splitting.
    pub stride: u64,
    /// Retained segment pairs in `data_dir`; `0` drops split-off segments
    /// silently.
    pub max_retained_files: u16,
}

impl BlockLogConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            archive_dir: None,
            stride: u64::MAX,
            max_retained_files: 10,
        }
    }
}

/// The live block log writer.
///
/// Invariant while open: both live files are open read/write and the index
/// mirrors the log exactly; if the log has entries, `head` is its last
/// block.
pub struct BlockLog {
    data_dir: PathBuf,
    log_path: PathBuf,
    index_path: PathBuf,
    block_file: File,
    index_file: File,
    head: Option<Block>,
    /// `None` until a reset (or an existing nonempty log) establishes the
    /// chain context; appending before that is an error.
    preamble: Option<Preamble>,
    stride: u64,
    catalog: Catalog,
}

impl BlockLog {
    /// Opens (or initializes) the block log in `config.data_dir`,
    /// reconciling the live pair after any crash and loading the catalog of
    /// archived segments.
    pub fn open(config: BlockLogConfig) -> Result<Self> {
        let data_dir = config.data_dir;
        std::fs::create_dir_all(&data_dir)?;

        let archive_dir = match config.archive_dir {
            Some(dir) => {
                let dir = if dir.is_relative() {
                    data_dir.join(dir)
                } else {
                    dir
                };
                std::fs::create_dir_all(&dir)?;
                Some(dir)
            }
            None => None,
        };

        let mut catalog = Catalog::new(archive_dir, config.max_retained_files);
        catalog.open(&data_dir)?;

        let log_path = data_dir.join(LOG_FILENAME);
        let index_path = data_dir.join(INDEX_FILENAME);
        ensure_file_exists(&log_path)?;
        ensure_file_exists(&index_path)?;

        let log_size = std::fs::metadata(&log_path)?.len();
        let index_size = std::fs::metadata(&index_path)?.len();

        let mut preamble = None;
        if log_size > 0 {
            let p = recovery::reconcile_on_open(&log_path, &index_path)?;
            if let Some(catalog_id) = catalog.chain_id() {
                if catalog_id != p.chain_id() {
                    return Err(BlockLogError::ChainIdMismatch(format!(
                        "live log '{}' disagrees with the catalog segments",
                        log_path.display()
                    )));
                }
            }
            preamble = Some(p);
        } else if index_size > 0 {
            tracing::info!("log file is empty while the index is not, discarding the index");
            let file = OpenOptions::new().write(true).open(&index_path)?;
            file.set_len(0)?;
            file.sync_data()?;
        }

        let block_file = open_rw(&log_path)?;
        let index_file = open_rw(&index_path)?;

        let mut log = Self {
            data_dir,
            log_path,
            index_path,
            block_file,
            index_file,
            head: None,
            preamble,
            stride: config.stride,
            catalog,
        };
        if log_size > 0 {
            log.read_head()?;
        }
        Ok(log)
    }

    /// The last appended block, if the live log has any.
    pub fn head(&self) -> Option<&Block> {
        self.head.as_ref()
    }

    /// The first block number reachable through this log: the oldest
    /// retained segment's if any, otherwise the live preamble's. `None`
    /// before the log has ever been reset.
    pub fn first_block_num(&self) -> Option<u32> {
        self.catalog
            .first_block_num()
            .or_else(|| self.preamble.as_ref().map(|p| p.first_block_num))
    }

    /// Format version of the live log file.
    pub fn version(&self) -> Option<u32> {
        self.preamble.as_ref().map(|p| p.version)
    }

    /// Chain id of the live log (derived from the genesis state when the
    /// preamble embeds one).
    pub fn chain_id(&self) -> Option<ChainId> {
        self.preamble.as_ref().map(|p| p.chain_id())
    }

    /// Number of archived segments currently retained in the data directory.
    pub fn num_retained_segments(&self) -> usize {
        self.catalog.len()
    }
}

impl std::fmt::Debug for BlockLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockLog")
            .field("data_dir", &self.data_dir)
            .field("head", &self.head.as_ref().map(|b| b.block_num()))
            .field("version", &self.version())
            .field(
                "first_block_num",
                &self.preamble.as_ref().map(|p| p.first_block_num),
            )
            .field("stride", &self.stride)
            .field("retained_segments", &self.catalog.len())
            .finish()
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        File::create(path)?;
    }
    Ok(())
}

fn open_rw(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

#[cfg(test)]
mod tests;
