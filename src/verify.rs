use super::*;

/// Pluggable Equihash solution check. The production binding wraps a native
/// verifier; tests swap in [`AcceptAll`].
pub trait EquihashVerifier: Send + Sync {
    fn verify(&self, header: &[u8], solution: &[u8], personalization: &str, n: u32, k: u32)
    -> bool;
}

/// Passes every solution through. Only meaningful in tests and on private
/// regtest chains where proof checking is the daemon's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EquihashVerifier for AcceptAll {
    fn verify(&self, _: &[u8], _: &[u8], _: &str, _: u32, _: u32) -> bool {
        true
    }
}

/// Hash used over the 140-byte header plus solution when ranking shares.
/// Almost every Equihash chain uses double sha256; a couple use single.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderDigest {
    #[default]
    Sha256d,
    Sha256,
}

impl HeaderDigest {
    pub fn digest(self, data: &[u8]) -> [u8; 32] {
        match self {
            HeaderDigest::Sha256d => sha256d::Hash::hash(data).to_byte_array(),
            HeaderDigest::Sha256 => sha256::Hash::hash(data).to_byte_array(),
        }
    }
}
