use anyhow::Result;
use std::fs;
use tempfile::tempdir;

use super::helpers::*;
use crate::data::LogData;
use crate::error::BlockLogError;
use crate::index::construct_index;
use crate::{trim_end, trim_front};

// --------------------- Trim end ---------------------

#[test]
fn trim_end_truncates_log_and_index() -> Result<()> {
    let dir = tempdir()?;
    let blocks = {
        let (_, blocks) = seeded_log(dir.path(), 5)?;
        blocks
    };

    assert!(trim_end(dir.path(), 3)?);
    assert_eq!(file_len(&dir.path().join("blocks.index")), 3 * 8);

    let mut log = open_log(dir.path())?;
    assert_eq!(log.head().unwrap(), &blocks[2]);
    assert!(log.read_block_by_num(4)?.is_none());
    for block in &blocks[..3] {
        assert_eq!(log.read_block_by_num(block.block_num())?.unwrap(), *block);
    }
    drop(log);
    crate::smoke_test(dir.path(), 1)?;
    Ok(())
}

#[test]
fn trim_end_outside_the_range_does_nothing() -> Result<()> {
    let dir = tempdir()?;
    {
        seeded_log(dir.path(), 3)?;
    }
    let log_len = file_len(&dir.path().join("blocks.log"));

    assert!(!trim_end(dir.path(), 3)?, "already the last block");
    assert!(!trim_end(dir.path(), 7)?, "past the end");
    assert!(!trim_end(dir.path(), 0)?, "before the first block");
    assert_eq!(file_len(&dir.path().join("blocks.log")), log_len);
    Ok(())
}

// --------------------- Trim front ---------------------

#[test]
fn trim_front_rewrites_positions_and_index() -> Result<()> {
    let dir = tempdir()?;
    let temp = tempdir()?;
    let blocks = {
        let (_, blocks) = seeded_log(dir.path(), 5)?;
        blocks
    };

    assert!(trim_front(dir.path(), temp.path(), 3)?);

    let data = LogData::open(dir.path().join("blocks.log"))?;
    assert_eq!(data.first_block_num(), 3);
    assert_eq!(data.version(), 4);
    assert!(data.genesis_state().is_none());
    assert_eq!(data.chain_id(), genesis().compute_chain_id());
    assert_eq!(data.num_blocks()?, 3);
    drop(data);

    // the rewritten trailer chain must light-validate end to end
    crate::smoke_test(dir.path(), 1)?;

    let mut log = open_log(dir.path())?;
    assert_eq!(log.first_block_num(), Some(3));
    assert_eq!(log.head().unwrap(), &blocks[4]);
    assert!(log.read_block_by_num(2)?.is_none());
    for block in &blocks[2..] {
        assert_eq!(log.read_block_by_num(block.block_num())?.unwrap(), *block);
    }

    // originals are parked in the temp dir
    assert!(temp.path().join("old.log").is_file());
    assert!(temp.path().join("old.index").is_file());
    Ok(())
}

#[test]
fn trim_front_outside_the_range_does_nothing() -> Result<()> {
    let dir = tempdir()?;
    let temp = tempdir()?;
    {
        seeded_log(dir.path(), 3)?;
    }
    let log_len = file_len(&dir.path().join("blocks.log"));

    assert!(!trim_front(dir.path(), temp.path(), 1)?, "nothing before block 1");
    assert!(!trim_front(dir.path(), temp.path(), 4)?, "past the end");
    assert_eq!(file_len(&dir.path().join("blocks.log")), log_len);
    Ok(())
}

#[test]
fn trim_front_rejects_equal_dirs() -> Result<()> {
    let dir = tempdir()?;
    {
        seeded_log(dir.path(), 2)?;
    }
    let err = trim_front(dir.path(), dir.path(), 2).unwrap_err();
    assert!(matches!(err, BlockLogError::BadEntry(_)));
    Ok(())
}

#[test]
fn trim_front_commutes_with_construct_index() -> Result<()> {
    let dir = tempdir()?;
    let temp = tempdir()?;
    {
        seeded_log(dir.path(), 6)?;
    }

    assert!(trim_front(dir.path(), temp.path(), 4)?);
    let trimmed_index = fs::read(dir.path().join("blocks.index"))?;

    // rebuilding the index from the trimmed log must reproduce it exactly
    construct_index(
        dir.path().join("blocks.log"),
        dir.path().join("blocks.index"),
    )?;
    assert_eq!(fs::read(dir.path().join("blocks.index"))?, trimmed_index);
    Ok(())
}

#[test]
fn trim_front_of_legacy_log_downgrades_to_version_three() -> Result<()> {
    let dir = tempdir()?;
    let temp = tempdir()?;
    let blocks = build_chain(4);
    super::format_tests::write_legacy_log(dir.path(), 3, &blocks)?;
    construct_index(
        dir.path().join("blocks.log"),
        dir.path().join("blocks.index"),
    )?;

    assert!(trim_front(dir.path(), temp.path(), 2)?);

    let data = LogData::open(dir.path().join("blocks.log"))?;
    assert_eq!(data.version(), 3, "pre-v4 sources stay pre-v4");
    assert_eq!(data.first_block_num(), 2);
    drop(data);

    let mut log = open_log(dir.path())?;
    for block in &blocks[1..] {
        assert_eq!(log.read_block_by_num(block.block_num())?.unwrap(), *block);
    }
    Ok(())
}
