use super::*;

/// Parameters of a mining.notify push. All hash fields are hex in header byte
/// order, so miners can splice them into the 140-byte header verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    pub job_id: String,
    pub version: String,
    pub prev_hash: String,
    pub merkle_root: String,
    pub reserved: String,
    pub ntime: Ntime,
    pub bits: String,
    pub clean_jobs: bool,
}

impl Serialize for Notify {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(8))?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.prev_hash)?;
        seq.serialize_element(&self.merkle_root)?;
        seq.serialize_element(&self.reserved)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.bits)?;
        seq.serialize_element(&self.clean_jobs)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Notify {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (job_id, version, prev_hash, merkle_root, reserved, ntime, bits, clean_jobs) =
            <(
                String,
                String,
                String,
                String,
                String,
                Ntime,
                String,
                bool,
            )>::deserialize(deserializer)?;

        Ok(Notify {
            job_id,
            version,
            prev_hash,
            merkle_root,
            reserved,
            ntime,
            bits,
            clean_jobs,
        })
    }
}
