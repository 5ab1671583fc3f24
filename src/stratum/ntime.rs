use super::*;

/// Little-endian wire hex, the exact byte order written into the block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Ntime(u32);

impl Ntime {
    pub fn wire_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl FromStr for Ntime {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 {
            return Err(InternalError::Parse {
                message: format!("incorrect size of ntime '{s}'"),
            });
        }

        let bytes = <[u8; 4]>::from_hex(s).map_err(|e| InternalError::Parse {
            message: format!("invalid hex in ntime '{s}': {e}"),
        })?;

        Ok(Ntime(u32::from_le_bytes(bytes)))
    }
}

impl Display for Ntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_le_bytes()))
    }
}

impl From<u32> for Ntime {
    fn from(time: u32) -> Ntime {
        Ntime(time)
    }
}

impl From<Ntime> for u32 {
    fn from(ntime: Ntime) -> u32 {
        ntime.0
    }
}
