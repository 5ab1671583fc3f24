use super::*;

/// mining.set_target params: a single 256-bit target as 64 hex characters.
#[derive(Debug, Clone, PartialEq)]
pub struct SetTarget(pub String);

impl SetTarget {
    /// Scales the powlimit down by the pool-side difficulty. The division is
    /// done at 1e9 fixed-point so targets agree with difficulties to the same
    /// nine digits the pool reports.
    pub fn from_difficulty(difficulty: f64) -> Self {
        const SCALE: u64 = 1_000_000_000;

        let denominator = (difficulty * SCALE as f64).round() as u64;

        let target = if denominator == 0 {
            U256::MAX
        } else {
            // the scaled numerator exceeds 256 bits, so widen for the division
            let scaled = DIFF1.full_mul(U256::from(SCALE)) / U512::from(denominator);
            U256::try_from(scaled).unwrap_or(U256::MAX)
        };

        SetTarget(hex::encode(target.to_big_endian()))
    }

    pub fn target_hex(&self) -> &str {
        &self.0
    }
}

impl Serialize for SetTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(&self.0)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SetTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (target,) = <(String,)>::deserialize(deserializer)?;
        Ok(SetTarget(target))
    }
}
