use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};

use crate::{CodecError, Result, MAX_NAME_BYTES};

/// A 32-byte chain identifier, derived from the genesis state.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChainId(pub [u8; 32]);

impl ChainId {
    pub fn pack<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.0)?;
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R) -> Result<Self> {
        let mut id = [0u8; 32];
        r.read_exact(&mut id)?;
        Ok(ChainId(id))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self)
    }
}

/// The chain's initial state, embedded in the first log file of a chain.
///
/// Wire format: `name_len: u32 LE`, name bytes, `initial_timestamp: u32 LE`,
/// `initial_producer: u64 LE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisState {
    pub network_name: String,
    pub initial_timestamp: u32,
    pub initial_producer: u64,
}

impl GenesisState {
    /// Derives the chain id: SHA-256 over the packed genesis bytes.
    ///
    /// Pure function of the genesis state; every log file of the same chain
    /// agrees on this value whether it embeds the state or the id.
    pub fn compute_chain_id(&self) -> ChainId {
        let mut buf = Vec::with_capacity(16 + self.network_name.len());
        self.pack(&mut buf).expect("write to Vec cannot fail");
        ChainId(Sha256::digest(&buf).into())
    }

    pub fn pack<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.network_name.len() as u32)?;
        w.write_all(self.network_name.as_bytes())?;
        w.write_u32::<LittleEndian>(self.initial_timestamp)?;
        w.write_u64::<LittleEndian>(self.initial_producer)?;
        Ok(())
    }

    pub fn unpack<R: Read>(r: &mut R) -> Result<Self> {
        let name_len = r.read_u32::<LittleEndian>()? as usize;
        if name_len > MAX_NAME_BYTES {
            return Err(CodecError::FieldTooLarge {
                field: "network name",
                len: name_len,
                max: MAX_NAME_BYTES,
            });
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let network_name = String::from_utf8(name)
            .map_err(|e| CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let initial_timestamp = r.read_u32::<LittleEndian>()?;
        let initial_producer = r.read_u64::<LittleEndian>()?;
        Ok(Self {
            network_name,
            initial_timestamp,
            initial_producer,
        })
    }
}
