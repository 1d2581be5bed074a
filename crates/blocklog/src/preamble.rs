//! The fixed header at the start of every log file.
//!
//! Format history:
//! - Version 1: complete log from genesis; the genesis state follows the
//!   version directly.
//! - Version 2: adds `first_block_num` so a log may start past genesis; a
//!   sentinel separates the preamble from the entries.
//! - Version 3: a log not starting at block 1 carries the chain id instead
//!   of the genesis state.
//! - Version 4: entries gain a size/compression frame (see `entry`).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chain::{ChainId, GenesisState};
use std::io::{Read, Write};

use crate::error::{BlockLogError, Result};

/// Sentinel value: preamble separator, "no position" return, and the
/// terminator of reverse position walks.
pub const NPOS: u64 = u64::MAX;

pub const MIN_SUPPORTED_VERSION: u32 = 1;
pub const MAX_SUPPORTED_VERSION: u32 = 4;

/// First version that may carry a chain id instead of a genesis state.
pub const GENESIS_OR_CHAIN_ID_VERSION: u32 = 3;
/// First version with framed entries supporting transaction pruning.
pub const PRUNED_TRANSACTION_VERSION: u32 = 4;

/// Preamble size when the chain context is a chain id:
/// version (4) + first_block_num (4) + chain id (32) + sentinel (8).
pub const PREAMBLE_NBYTES_WITH_CHAIN_ID: u64 = 48;

/// The chain context embedded in a preamble: the full genesis state for logs
/// covering block 1, otherwise just the derived chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainContext {
    Genesis(GenesisState),
    Id(ChainId),
}

impl ChainContext {
    pub fn chain_id(&self) -> ChainId {
        match self {
            ChainContext::Genesis(state) => state.compute_chain_id(),
            ChainContext::Id(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub version: u32,
    pub first_block_num: u32,
    pub context: ChainContext,
}

impl Preamble {
    pub fn is_supported_version(version: u32) -> bool {
        (MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version)
    }

    /// A log file with this version and first block embeds the genesis state.
    pub fn contains_genesis_state(version: u32, first_block_num: u32) -> bool {
        version < GENESIS_OR_CHAIN_ID_VERSION || first_block_num == 1
    }

    /// A log file with this version and first block embeds the chain id.
    pub fn contains_chain_id(version: u32, first_block_num: u32) -> bool {
        version >= GENESIS_OR_CHAIN_ID_VERSION && first_block_num > 1
    }

    pub fn chain_id(&self) -> ChainId {
        self.context.chain_id()
    }

    pub fn genesis_state(&self) -> Option<&GenesisState> {
        match &self.context {
            ChainContext::Genesis(state) => Some(state),
            ChainContext::Id(_) => None,
        }
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let version = r.read_u32::<LittleEndian>()?;
        if version == 0 {
            return Err(BlockLogError::BadPreamble(
                "block log was not set up properly".to_string(),
            ));
        }
        if !Self::is_supported_version(version) {
            return Err(BlockLogError::UnsupportedVersion {
                version,
                min: MIN_SUPPORTED_VERSION,
                max: MAX_SUPPORTED_VERSION,
            });
        }

        let first_block_num = if version == 1 {
            1
        } else {
            r.read_u32::<LittleEndian>()?
        };

        let context = if Self::contains_genesis_state(version, first_block_num) {
            ChainContext::Genesis(GenesisState::unpack(r)?)
        } else if Self::contains_chain_id(version, first_block_num) {
            ChainContext::Id(ChainId::unpack(r)?)
        } else {
            return Err(BlockLogError::BadPreamble(format!(
                "version {} with first block {} contains neither a genesis state nor a chain id",
                version, first_block_num
            )));
        };

        if version != 1 {
            let sentinel = r.read_u64::<LittleEndian>()?;
            if sentinel != NPOS {
                return Err(BlockLogError::BadPreamble(format!(
                    "expected separator {:#018x} between preamble and entries, found {:#018x}",
                    NPOS, sentinel
                )));
            }
        }

        Ok(Self {
            version,
            first_block_num,
            context,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.version)?;
        if self.version == 1 {
            match &self.context {
                ChainContext::Genesis(state) => state.pack(w)?,
                ChainContext::Id(_) => {
                    return Err(BlockLogError::BadPreamble(
                        "version 1 log files must embed a genesis state".to_string(),
                    ))
                }
            }
            return Ok(());
        }

        w.write_u32::<LittleEndian>(self.first_block_num)?;
        match &self.context {
            ChainContext::Genesis(state) => state.pack(w)?,
            ChainContext::Id(id) => id.pack(w)?,
        }
        w.write_u64::<LittleEndian>(NPOS)?;
        Ok(())
    }
}
