use super::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Extranonce(Vec<u8>);

impl Extranonce {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, InternalError> {
        let bytes = hex::decode(s).map_err(|e| InternalError::Parse {
            message: format!("invalid extranonce hex '{s}': {e}"),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Extranonce {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Extranonce {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Self::from_hex(&s).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Display for Extranonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Extranonce {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
