use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};

use crate::{Compression, Result, Transaction, MAX_TRANSACTIONS};

/// Byte offset of the `previous` block id inside a packed [`BlockHeader`]
/// (timestamp 4 + producer 8 + confirmed 2).
pub const PREV_BLOCK_ID_OFFSET: usize = 14;

/// A 32-byte block identifier.
///
/// The first 4 bytes are the big-endian block number of the identified
/// block; the remaining 28 bytes come from the SHA-256 digest of the packed
/// header. The all-zero id is the "no previous block" sentinel carried by
/// block 1.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    /// Block number embedded in the id (big-endian first 4 bytes).
    pub fn block_num(&self) -> u32 {
        BigEndian::read_u32(&self.0[..4])
    }

    /// True for the all-zero sentinel id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self)
    }
}

/// Fixed-size block header.
///
/// Packed little-endian except for the raw id bytes; see the layout note in
/// the crate docs. `previous` must start at [`PREV_BLOCK_ID_OFFSET`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub timestamp: u32,
    pub producer: u64,
    pub confirmed: u16,
    pub previous: BlockId,
}

impl BlockHeader {
    /// Packed size in bytes: 4 + 8 + 2 + 32.
    pub const PACKED_SIZE: usize = 46;

    /// This block's number: one past the number embedded in `previous`.
    pub fn block_num(&self) -> u32 {
        self.previous.block_num() + 1
    }

    /// Computes the header id: SHA-256 of the packed bytes with the first
    /// 4 bytes overwritten by the big-endian block number.
    pub fn id(&self) -> BlockId {
        let mut buf = Vec::with_capacity(Self::PACKED_SIZE);
        self.pack(&mut buf).expect("write to Vec cannot fail");
        let mut digest: [u8; 32] = Sha256::digest(&buf).into();
        BigEndian::write_u32(&mut digest[..4], self.block_num());
        BlockId(digest)
    }

    pub fn pack<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.timestamp)?;
        w.write_u64::<LittleEndian>(self.producer)?;
        w.write_u16::<LittleEndian>(self.confirmed)?;
        w.write_all(&self.previous.0)?;
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R) -> Result<Self> {
        let timestamp = r.read_u32::<LittleEndian>()?;
        let producer = r.read_u64::<LittleEndian>()?;
        let confirmed = r.read_u16::<LittleEndian>()?;
        let mut previous = [0u8; 32];
        r.read_exact(&mut previous)?;
        Ok(Self {
            timestamp,
            producer,
            confirmed,
            previous: BlockId(previous),
        })
    }
}

/// A finalized block: header plus transactions.
///
/// Wire format: packed header, `tx_count: u32 LE`, then each transaction in
/// order. The `Compression` tag accepted by `pack`/`unpack` is part of the
/// entry framing contract with the block log; only `None` exists today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }

    pub fn id(&self) -> BlockId {
        self.header.id()
    }

    /// Exact size of the current serialization in bytes.
    pub fn packed_size(&self) -> usize {
        BlockHeader::PACKED_SIZE
            + 4
            + self
                .transactions
                .iter()
                .map(Transaction::packed_size)
                .sum::<usize>()
    }

    /// Largest size any pruning state of this block can serialize to.
    ///
    /// Pruning only ever removes payload bytes, so the maximum is the
    /// current size. The block log sizes entry padding from this value so an
    /// in-place prune never needs to move subsequent entries.
    pub fn maximum_pruned_pack_size(&self, _compression: Compression) -> usize {
        self.packed_size()
    }

    pub fn pack<W: Write>(&self, w: &mut W, _compression: Compression) -> Result<()> {
        self.header.pack(w)?;
        w.write_u32::<LittleEndian>(self.transactions.len() as u32)?;
        for tx in &self.transactions {
            tx.pack(w)?;
        }
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R, _compression: Compression) -> Result<Self> {
        let header = BlockHeader::unpack(r)?;
        let count = r.read_u32::<LittleEndian>()? as usize;
        if count > MAX_TRANSACTIONS {
            return Err(crate::CodecError::FieldTooLarge {
                field: "transaction count",
                len: count,
                max: MAX_TRANSACTIONS,
            });
        }
        let mut transactions = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            transactions.push(Transaction::unpack(r)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}
