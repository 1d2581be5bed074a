use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the block log core.
///
/// Structural problems found at open time are handled by local recovery and
/// normally never surface; problems during an append are fatal to that call.
/// Out-of-range block lookups return an absent value rather than an error.
#[derive(Debug, Error)]
pub enum BlockLogError {
    /// A log file carries a version outside the supported range.
    #[error("unsupported block log version {version}, supported versions are [{min},{max}]")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },

    /// The fixed header of a log file could not be decoded.
    #[error("bad block log preamble: {0}")]
    BadPreamble(String),

    /// An entry's framing or contents are inconsistent.
    #[error("bad block log entry: {0}")]
    BadEntry(String),

    /// The log and its sidecar index disagree.
    #[error("block log and index disagree: {0}")]
    IndexMismatch(String),

    /// `append` was called before `reset_with_genesis`/`reset_with_chain_id`.
    #[error("cannot append to block log until a genesis state or chain id has been written")]
    AppendBeforeGenesis,

    /// The index file end does not match the block number being appended.
    #[error("append to index file at wrong position: expected {expected}, found {actual}")]
    AppendPositionMismatch { expected: u64, actual: u64 },

    /// A decoded block carries a different number than the caller expected.
    #[error("wrong block read from block log: expected number {expected}, found {actual}")]
    WrongBlockNumber { expected: u32, actual: u32 },

    /// Pre-v4 logs only store uncompressed blocks.
    #[error("block log version {0} only supports \"none\" compression")]
    LegacyCompressionRejected(u32),

    /// The requested block number is not present (used by operations that
    /// require the block, e.g. transaction pruning).
    #[error("block {0} does not exist in block log")]
    NotFound(u32),

    /// Two log files of the same catalog carry different chain ids, or the
    /// live log disagrees with the catalog.
    #[error("chain id mismatch: {0}")]
    ChainIdMismatch(String),

    /// A catalog segment was added out of ascending first-block order.
    #[error("segment starting at block {start} does not extend the catalog (last start is {last})")]
    NonMonotonicSegment { start: u32, last: u32 },

    /// The repair backup target already exists.
    #[error("cannot move blocks directory to already existing '{}'", .0.display())]
    BackupDirExists(PathBuf),

    /// No `blocks.log` at the given location.
    #[error("no block log found in '{}'", .0.display())]
    LogNotFound(PathBuf),

    /// A chain value type failed to pack or unpack.
    #[error("block codec error: {0}")]
    Codec(#[from] chain::CodecError),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlockLogError>;
