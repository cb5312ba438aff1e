pub mod prng;
use crate::primitives::prp::prng::Aes128Prng;
use crate::primitives::{AesBlock, Prp, PrpError, PrpResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Pseudorandom permutation over a domain of at most 256 elements,
/// generated by a Knuth shuffle driven by an AES-CTR stream.
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct KnuthShufflePrp {
    forward: Vec<u8>,
    inverse: Vec<u8>,
}

impl Prp for KnuthShufflePrp {
    fn new(key: &AesBlock, size: usize) -> PrpResult<Self> {
        if size == 0 || size > 256 {
            return Err(PrpError::UnsupportedDomain(size));
        }

        let mut forward: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let mut rng = Aes128Prng::init(key.as_slice());

        // Knuth Shuffle
        (1..size).rev().for_each(|i| {
            let j = rng.gen_range(i as u8);
            forward.swap(i, j as usize);
        });

        let mut inverse = vec![0u8; size];
        for (i, &p) in forward.iter().enumerate() {
            inverse[p as usize] = i as u8;
        }

        Ok(Self { forward, inverse })
    }

    fn permute(&self, data: u8) -> PrpResult<u8> {
        self.forward
            .get(data as usize)
            .copied()
            .ok_or(PrpError::OutOfDomain {
                value: data,
                size: self.forward.len(),
            })
    }

    fn invert(&self, data: u8) -> PrpResult<u8> {
        self.inverse
            .get(data as usize)
            .copied()
            .ok_or(PrpError::OutOfDomain {
                value: data,
                size: self.inverse.len(),
            })
    }
}
