use super::*;
use byteorder::{BigEndian, ByteOrder};

fn tx(id_byte: u8, payload: &[u8]) -> Transaction {
    Transaction {
        id: TxId([id_byte; 32]),
        payload: Some(payload.to_vec()),
    }
}

fn block_after(previous: BlockId, txs: Vec<Transaction>) -> Block {
    Block {
        header: BlockHeader {
            timestamp: 1_600_000_000,
            producer: 42,
            confirmed: 0,
            previous,
        },
        transactions: txs,
    }
}

// --------------------- Header layout ---------------------

#[test]
fn header_packs_to_fixed_size_with_previous_at_offset_14() {
    let header = BlockHeader {
        timestamp: 0x11223344,
        producer: 7,
        confirmed: 1,
        previous: BlockId([0xAB; 32]),
    };
    let mut buf = Vec::new();
    header.pack(&mut buf).unwrap();

    assert_eq!(buf.len(), BlockHeader::PACKED_SIZE);
    assert_eq!(&buf[PREV_BLOCK_ID_OFFSET..], &[0xAB; 32][..]);
    // timestamp is little-endian at offset 0
    assert_eq!(&buf[..4], &[0x44, 0x33, 0x22, 0x11]);
}

#[test]
fn header_roundtrip() {
    let header = BlockHeader {
        timestamp: 123,
        producer: u64::MAX,
        confirmed: 65535,
        previous: BlockId([9; 32]),
    };
    let mut buf = Vec::new();
    header.pack(&mut buf).unwrap();
    let back = BlockHeader::unpack(&mut &buf[..]).unwrap();
    assert_eq!(back, header);
}

// --------------------- Block numbers and ids ---------------------

#[test]
fn block_num_is_one_past_previous() {
    let mut prev = [0u8; 32];
    BigEndian::write_u32(&mut prev[..4], 41);
    let b = block_after(BlockId(prev), vec![]);
    assert_eq!(b.block_num(), 42);
}

#[test]
fn genesis_block_has_number_one() {
    let b = block_after(BlockId::default(), vec![]);
    assert!(b.header.previous.is_zero());
    assert_eq!(b.block_num(), 1);
}

#[test]
fn id_embeds_big_endian_block_num() {
    let b = block_after(BlockId::default(), vec![tx(1, b"hello")]);
    let id = b.id();
    assert_eq!(id.block_num(), 1);
    assert_eq!(BigEndian::read_u32(&id.0[..4]), 1);
}

#[test]
fn id_depends_on_header_contents() {
    let a = block_after(BlockId::default(), vec![]);
    let mut b = a.clone();
    b.header.timestamp += 1;
    assert_ne!(a.id().0[4..], b.id().0[4..]);
}

// --------------------- Block codec ---------------------

#[test]
fn block_roundtrip_with_transactions() {
    let b = block_after(
        BlockId::default(),
        vec![tx(1, b"first"), tx(2, b""), tx(3, &[0u8; 1024])],
    );
    let mut buf = Vec::new();
    b.pack(&mut buf, Compression::None).unwrap();
    assert_eq!(buf.len(), b.packed_size());

    let back = Block::unpack(&mut &buf[..], Compression::None).unwrap();
    assert_eq!(back, b);
}

#[test]
fn block_roundtrip_empty() {
    let b = block_after(BlockId::default(), vec![]);
    let mut buf = Vec::new();
    b.pack(&mut buf, Compression::None).unwrap();
    let back = Block::unpack(&mut &buf[..], Compression::None).unwrap();
    assert_eq!(back, b);
}

#[test]
fn truncated_block_fails_to_unpack() {
    let b = block_after(BlockId::default(), vec![tx(1, b"payload")]);
    let mut buf = Vec::new();
    b.pack(&mut buf, Compression::None).unwrap();
    buf.truncate(buf.len() - 3);
    assert!(Block::unpack(&mut &buf[..], Compression::None).is_err());
}

#[test]
fn absurd_transaction_count_is_rejected() {
    let b = block_after(BlockId::default(), vec![]);
    let mut buf = Vec::new();
    b.pack(&mut buf, Compression::None).unwrap();
    // overwrite tx_count with u32::MAX
    let off = BlockHeader::PACKED_SIZE;
    buf[off..off + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(
        Block::unpack(&mut &buf[..], Compression::None),
        Err(CodecError::FieldTooLarge { .. })
    ));
}

// --------------------- Pruning ---------------------

#[test]
fn prune_shrinks_serialization_but_keeps_id() {
    let mut b = block_after(BlockId::default(), vec![tx(7, &[1u8; 512])]);
    let before = b.packed_size();
    let max = b.maximum_pruned_pack_size(Compression::None);

    assert!(b.transactions[0].prune());
    assert!(b.transactions[0].is_pruned());
    assert_eq!(b.transactions[0].id, TxId([7; 32]));
    assert!(b.packed_size() < before);
    assert!(b.packed_size() <= max);

    // pruning twice is a no-op
    assert!(!b.transactions[0].prune());
}

#[test]
fn pruned_transaction_roundtrip() {
    let mut t = tx(9, b"gone soon");
    t.prune();
    let mut buf = Vec::new();
    t.pack(&mut buf).unwrap();
    assert_eq!(buf.len(), t.packed_size());
    let back = Transaction::unpack(&mut &buf[..]).unwrap();
    assert_eq!(back, t);
}

#[test]
fn unknown_tx_status_is_rejected() {
    let mut buf = vec![7u8]; // bogus status
    buf.extend_from_slice(&[0u8; 32]);
    assert!(matches!(
        Transaction::unpack(&mut &buf[..]),
        Err(CodecError::UnknownTxStatus(7))
    ));
}

// --------------------- Genesis / chain id ---------------------

#[test]
fn genesis_roundtrip() {
    let gs = GenesisState {
        network_name: "testnet".to_string(),
        initial_timestamp: 1_500_000_000,
        initial_producer: 1,
    };
    let mut buf = Vec::new();
    gs.pack(&mut buf).unwrap();
    let back = GenesisState::unpack(&mut &buf[..]).unwrap();
    assert_eq!(back, gs);
}

#[test]
fn chain_id_is_deterministic_and_state_sensitive() {
    let gs = GenesisState {
        network_name: "mainnet".to_string(),
        initial_timestamp: 1,
        initial_producer: 2,
    };
    let mut other = gs.clone();
    other.initial_timestamp = 3;

    assert_eq!(gs.compute_chain_id(), gs.compute_chain_id());
    assert_ne!(gs.compute_chain_id(), other.compute_chain_id());
}

#[test]
fn unknown_compression_tag_is_rejected() {
    assert!(Compression::try_from(0).is_ok());
    assert!(matches!(
        Compression::try_from(3),
        Err(CodecError::UnknownCompression(3))
    ));
}
