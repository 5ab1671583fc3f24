use super::*;

/// Full 256-bit header nonce: extranonce1 followed by the miner-chosen tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Nonce([u8; 32]);

impl Nonce {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Nonce {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(InternalError::Parse {
                message: format!("incorrect size of nonce '{s}'"),
            });
        }

        let bytes = <[u8; 32]>::from_hex(s).map_err(|e| InternalError::Parse {
            message: format!("invalid hex in nonce: {e}"),
        })?;

        Ok(Nonce(bytes))
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Nonce {
    fn from(bytes: [u8; 32]) -> Nonce {
        Nonce(bytes)
    }
}
