use crate::ore::{OreError, OreResult};
use serde::{Deserialize, Serialize};

/// Plaintext width and block size of an ORE instance.
///
/// `nbits / block_bits` blocks are produced per ciphertext. A single block
/// (`nbits == block_bits`) is the small-domain regime; anything else is the
/// multi-block regime. Both share the same comparison contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParams", into = "RawParams")]
pub struct OreParams {
    nbits: u32,
    block_bits: u32,
}

#[derive(Serialize, Deserialize)]
struct RawParams {
    nbits: u32,
    block_bits: u32,
}

impl TryFrom<RawParams> for OreParams {
    type Error = OreError;

    fn try_from(raw: RawParams) -> OreResult<Self> {
        OreParams::new(raw.nbits, raw.block_bits)
    }
}

impl From<OreParams> for RawParams {
    fn from(params: OreParams) -> Self {
        RawParams {
            nbits: params.nbits,
            block_bits: params.block_bits,
        }
    }
}

impl Default for OreParams {
    fn default() -> Self {
        Self {
            nbits: 32,
            block_bits: 8,
        }
    }
}

impl OreParams {
    pub const MAX_BITS: u32 = 64;
    pub const MAX_BLOCK_BITS: u32 = 8;

    pub fn new(nbits: u32, block_bits: u32) -> OreResult<Self> {
        if nbits == 0 || nbits > Self::MAX_BITS {
            return Err(OreError::InvalidParams(format!(
                "plaintext width must be between 1 and {} bits, got {}",
                Self::MAX_BITS,
                nbits
            )));
        }
        if block_bits == 0 || block_bits > Self::MAX_BLOCK_BITS {
            return Err(OreError::InvalidParams(format!(
                "block width must be between 1 and {} bits, got {}",
                Self::MAX_BLOCK_BITS,
                block_bits
            )));
        }
        if nbits % block_bits != 0 {
            return Err(OreError::InvalidParams(format!(
                "{} bit plaintexts cannot be split into {} bit blocks",
                nbits, block_bits
            )));
        }
        Ok(Self { nbits, block_bits })
    }

    /// Single-block parameters for plaintexts of up to 8 bits.
    pub fn small(bits: u32) -> OreResult<Self> {
        Self::new(bits, bits)
    }

    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }

    pub fn num_blocks(&self) -> usize {
        (self.nbits / self.block_bits) as usize
    }

    pub fn is_small(&self) -> bool {
        self.num_blocks() == 1
    }

    /// Number of slots in a block domain, `2^block_bits`.
    pub fn domain_size(&self) -> usize {
        1 << self.block_bits
    }

    /// Bytes needed to pack one 2-bit residue per slot.
    pub fn right_block_len(&self) -> usize {
        (self.domain_size() * 2 + 7) / 8
    }

    pub fn max_value(&self) -> u64 {
        u64::MAX >> (64 - self.nbits)
    }

    pub fn check(&self, value: u64) -> OreResult<()> {
        if value > self.max_value() {
            return Err(OreError::OutOfRange {
                value,
                nbits: self.nbits,
            });
        }
        Ok(())
    }

    /// Value of block `i` (block 0 is the most significant).
    pub(crate) fn block(&self, value: u64, i: usize) -> u8 {
        let shift = self.nbits - (i as u32 + 1) * self.block_bits;
        let mask = (1u64 << self.block_bits) - 1;
        ((value >> shift) & mask) as u8
    }

    /// All blocks preceding block `i`, as an integer.
    pub(crate) fn prefix(&self, value: u64, i: usize) -> u64 {
        let shift = self.nbits - i as u32 * self.block_bits;
        value.checked_shr(shift).unwrap_or(0)
    }
}
