use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret key for the ORE scheme: one AES key for the PRF producing
/// comparison tokens and one for deriving the per-block permutations.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OreKey {
    #[serde(with = "hex::serde")]
    pub(crate) prf_key: [u8; 16],
    #[serde(with = "hex::serde")]
    pub(crate) prp_key: [u8; 16],
}

impl OreKey {
    pub fn new(prf_key: [u8; 16], prp_key: [u8; 16]) -> Self {
        Self { prf_key, prp_key }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut prf_key = [0u8; 16];
        let mut prp_key = [0u8; 16];
        rng.fill_bytes(&mut prf_key);
        rng.fill_bytes(&mut prp_key);
        Self { prf_key, prp_key }
    }
}

impl std::fmt::Debug for OreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OreKey").finish_non_exhaustive()
    }
}
