//! Block order-revealing encryption in the style of Lewi and Wu.
//!
//! A plaintext in `[0, 2^nbits)` is split into `nbits / block_bits` blocks, most
//! significant first. Each block is encrypted twice:
//!
//! * the *left* ciphertext is a short token `(F(k1, prefix || π(x_i)), π(x_i))`
//!   used only to query;
//! * the *right* ciphertext stores, for every slot `j` of the block domain, the
//!   residue `cmp(π⁻¹(j), y_i) + H(F(k1, prefix || j), nonce) mod 3`.
//!
//! Comparing a left ciphertext against a right one resolves at the first block
//! whose residue differs from the hash of the left token.
//!
//! ```
//! use ore_store::ore::{OreCipher, OreKey, OreParams};
//! use std::cmp::Ordering;
//!
//! let key = OreKey::generate(&mut rand::thread_rng());
//! let ore = OreCipher::init(&key, OreParams::default()).unwrap();
//! let a = ore.encrypt(18, &mut rand::thread_rng()).unwrap();
//! let b = ore.encrypt(35, &mut rand::thread_rng()).unwrap();
//!
//! assert_eq!(a.left.compare(&b.right).unwrap(), Ordering::Less);
//! assert!(b.left > a.right);
//! ```
pub mod ciphertext;
pub mod format;
pub mod key;
pub mod params;
pub mod scheme;

pub use self::ciphertext::{LeftBlock, OreCiphertext, OreLeft, OreRight, RightBlock};
pub use self::key::OreKey;
pub use self::params::OreParams;
pub use self::scheme::OreCipher;

use crate::primitives::PrpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OreError {
    #[error("invalid ORE parameters: {0}")]
    InvalidParams(String),
    #[error("plaintext {value} does not fit in {nbits} bits")]
    OutOfRange { value: u64, nbits: u32 },
    #[error("ciphertexts are not comparable: {0}")]
    CiphertextMismatch(String),
    #[error("malformed ciphertext: {0}")]
    Parse(String),
    #[error(transparent)]
    Prp(#[from] PrpError),
}

pub type OreResult<T> = Result<T, OreError>;
