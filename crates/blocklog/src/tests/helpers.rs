use anyhow::Result;
use chain::{Block, BlockHeader, BlockId, Compression, GenesisState, Transaction, TxId};
use std::fs;
use std::path::Path;

use crate::catalog::parse_segment_log_name;
use crate::{BlockLog, BlockLogConfig};

pub fn genesis() -> GenesisState {
    GenesisState {
        network_name: "testnet".to_string(),
        initial_timestamp: 1_600_000_000,
        initial_producer: 11,
    }
}

pub fn make_block(previous: BlockId, num_txs: usize, seed: u8) -> Block {
    let transactions = (0..num_txs)
        .map(|i| Transaction {
            id: TxId([seed.wrapping_add(i as u8 + 1); 32]),
            payload: Some(vec![seed; 64 + i * 8]),
        })
        .collect();
    Block {
        header: BlockHeader {
            timestamp: 1_600_000_000 + seed as u32,
            producer: 7,
            confirmed: 0,
            previous,
        },
        transactions,
    }
}

/// Builds a linked chain of blocks 1..=count.
pub fn build_chain(count: u32) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count as usize);
    let mut previous = BlockId::default();
    for i in 0..count {
        let block = make_block(previous, (i % 3) as usize + 1, i as u8);
        previous = block.id();
        blocks.push(block);
    }
    blocks
}

pub fn open_log(dir: &Path) -> Result<BlockLog> {
    Ok(BlockLog::open(BlockLogConfig::new(dir))?)
}

/// Opens a fresh log in `dir` and fills it with a chain of `count` blocks.
pub fn seeded_log(dir: &Path, count: u32) -> Result<(BlockLog, Vec<Block>)> {
    let blocks = build_chain(count);
    let mut log = open_log(dir)?;
    log.reset_with_genesis(genesis(), &blocks[0], Compression::None)?;
    for block in &blocks[1..] {
        log.append(block, Compression::None)?;
    }
    Ok((log, blocks))
}

pub fn count_segment_pairs(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| parse_segment_log_name(name).is_some())
                .unwrap_or(false)
        })
        .count()
}

pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

pub fn last_index_position(dir: &Path) -> u64 {
    let bytes = fs::read(dir.join("blocks.index")).unwrap();
    u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap())
}

pub fn truncate_file(path: &Path, new_len: u64) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(new_len).unwrap();
}
