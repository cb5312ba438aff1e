pub mod hash;
pub mod prf;
pub mod prp;

use aes::cipher::{consts::U16, generic_array::GenericArray};
use aes::Block;
use thiserror::Error;

pub type AesBlock = Block;
pub type PrfKey = GenericArray<u8, U16>;
pub type HashKey = GenericArray<u8, U16>;
pub const NONCE_SIZE: usize = 16;

pub trait Prf {
    fn new(key: &PrfKey) -> Self;
    fn encrypt_all(&self, data: &mut [AesBlock]);
}

/// A random oracle into a small residue ring, keyed by a per-ciphertext nonce.
pub trait Hash {
    fn new(key: &HashKey) -> Self;
    fn hash(&self, data: &AesBlock) -> u8;
    fn hash_all(&self, input: &mut [AesBlock]) -> Vec<u8>;
}

#[derive(Debug, Error)]
pub enum PrpError {
    #[error("permutation domain of {0} elements is not supported")]
    UnsupportedDomain(usize),
    #[error("value {value} is outside the permutation domain of {size} elements")]
    OutOfDomain { value: u8, size: usize },
}

pub type PrpResult<T> = Result<T, PrpError>;

pub trait Prp: Sized {
    fn new(key: &AesBlock, size: usize) -> PrpResult<Self>;
    fn permute(&self, data: u8) -> PrpResult<u8>;
    fn invert(&self, data: u8) -> PrpResult<u8>;
}
