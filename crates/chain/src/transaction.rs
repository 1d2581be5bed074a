use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

use crate::{CodecError, Result, MAX_PAYLOAD_BYTES};

const STATUS_FULL: u8 = 0;
const STATUS_PRUNED: u8 = 1;

/// A 32-byte transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

/// A transaction as stored inside a block.
///
/// `payload: None` is the pruned state: the id stays on disk so receipts
/// remain verifiable, the body is gone. Pruning strictly shrinks the
/// serialization (by the 4-byte length prefix plus the payload bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub payload: Option<Vec<u8>>,
}

impl Transaction {
    /// Drops the payload. Returns `true` if there was one to drop.
    pub fn prune(&mut self) -> bool {
        self.payload.take().is_some()
    }

    pub fn is_pruned(&self) -> bool {
        self.payload.is_none()
    }

    pub fn packed_size(&self) -> usize {
        match &self.payload {
            Some(p) => 1 + 32 + 4 + p.len(),
            None => 1 + 32,
        }
    }

    pub fn pack<W: Write>(&self, w: &mut W) -> Result<()> {
        match &self.payload {
            Some(p) => {
                w.write_u8(STATUS_FULL)?;
                w.write_all(&self.id.0)?;
                w.write_u32::<LittleEndian>(p.len() as u32)?;
                w.write_all(p)?;
            }
            None => {
                w.write_u8(STATUS_PRUNED)?;
                w.write_all(&self.id.0)?;
            }
        }
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R) -> Result<Self> {
        let status = r.read_u8()?;
        let mut id = [0u8; 32];
        r.read_exact(&mut id)?;
        let payload = match status {
            STATUS_FULL => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                if len > MAX_PAYLOAD_BYTES {
                    return Err(CodecError::FieldTooLarge {
                        field: "transaction payload",
                        len,
                        max: MAX_PAYLOAD_BYTES,
                    });
                }
                let mut payload = vec![0u8; len];
                r.read_exact(&mut payload)?;
                Some(payload)
            }
            STATUS_PRUNED => None,
            other => return Err(CodecError::UnknownTxStatus(other)),
        };
        Ok(Self {
            id: TxId(id),
            payload,
        })
    }
}
