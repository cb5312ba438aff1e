use crate::ore::{OreError, OreParams, OreResult};
use crate::primitives::{hash::Aes128Z3Hash, AesBlock, Hash, NONCE_SIZE};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use subtle_ng::ConstantTimeEq;

/// One block of a left ciphertext: the PRF token and the permuted block value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeftBlock {
    #[serde(with = "hex::serde")]
    pub key: [u8; 16],
    pub index: u8,
}

/// Packed 2-bit residues, one per slot of the block domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RightBlock(#[serde(with = "hex::serde")] pub(crate) Vec<u8>);

impl RightBlock {
    pub(crate) fn with_slots(slots: usize) -> Self {
        Self(vec![0u8; (slots * 2 + 7) / 8])
    }

    #[inline]
    pub(crate) fn set(&mut self, slot: usize, residue: u8) {
        debug_assert!(residue < 3);
        let shift = (slot % 4) * 2;
        self.0[slot / 4] &= !(0b11 << shift);
        self.0[slot / 4] |= residue << shift;
    }

    #[inline]
    pub(crate) fn get(&self, slot: usize) -> Option<u8> {
        let shift = (slot % 4) * 2;
        self.0.get(slot / 4).map(|byte| (byte >> shift) & 0b11)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Query token. Reveals nothing on its own; it can only be compared
/// against a right ciphertext produced under the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OreLeft {
    pub params: OreParams,
    pub blocks: Vec<LeftBlock>,
}

/// Stored half of an ORE ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OreRight {
    pub params: OreParams,
    #[serde(with = "hex::serde")]
    pub nonce: [u8; NONCE_SIZE],
    pub blocks: Vec<RightBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OreCiphertext {
    pub left: OreLeft,
    pub right: OreRight,
}

impl OreLeft {
    /// Compares the plaintext behind this token with the one behind `right`.
    ///
    /// Returns `Greater` when the left plaintext is the larger of the two.
    pub fn compare(&self, right: &OreRight) -> OreResult<Ordering> {
        if self.params != right.params {
            return Err(OreError::CiphertextMismatch(format!(
                "left uses {:?} but right uses {:?}",
                self.params, right.params
            )));
        }
        if self.blocks.len() != self.params.num_blocks()
            || right.blocks.len() != self.params.num_blocks()
        {
            return Err(OreError::CiphertextMismatch(format!(
                "expected {} blocks, got {} left and {} right",
                self.params.num_blocks(),
                self.blocks.len(),
                right.blocks.len()
            )));
        }

        let hasher = Aes128Z3Hash::from_nonce(&right.nonce);
        for (l, r) in self.blocks.iter().zip(right.blocks.iter()) {
            let residue = r.get(l.index as usize).ok_or_else(|| {
                OreError::CiphertextMismatch(format!(
                    "slot {} is outside the right block",
                    l.index
                ))
            })?;
            let h = hasher.hash(AesBlock::from_slice(&l.key));
            match (residue + 3 - h) % 3 {
                0 => continue,
                1 => return Ok(Ordering::Greater),
                _ => return Ok(Ordering::Less),
            }
        }

        Ok(Ordering::Equal)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// Two tokens for the same plaintext under the same key are identical.
impl PartialEq for OreLeft {
    fn eq(&self, other: &Self) -> bool {
        if self.params != other.params || self.blocks.len() != other.blocks.len() {
            return false;
        }
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .fold(subtle_ng::Choice::from(1u8), |acc, (a, b)| {
                acc & a.key[..].ct_eq(&b.key[..]) & a.index.ct_eq(&b.index)
            })
            .into()
    }
}

impl PartialEq<OreRight> for OreLeft {
    fn eq(&self, other: &OreRight) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl PartialOrd<OreRight> for OreLeft {
    fn partial_cmp(&self, other: &OreRight) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl PartialEq for OreCiphertext {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left
    }
}

impl PartialOrd for OreCiphertext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.left.partial_cmp(&other.right)
    }
}
