//! Value ciphers used by the attribute dispatcher alongside ORE.
pub mod elgamal;
pub mod paillier;
pub mod symmetric;

pub use self::elgamal::{ElGamal, ElGamalCiphertext, ElGamalKeys};
pub use self::paillier::{Paillier, PaillierCiphertext, PaillierKeys, PaillierPublicKey};
pub use self::symmetric::{SymmetricCipher, SymmetricKey};

use num::bigint::RandBigInt;
use num::{BigUint, One};
use num_prime::nt_funcs::is_prime;
use num_prime::PrimalityTestConfig;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("message is outside the plaintext space: {0}")]
    OutOfRange(String),
    #[error("ciphertexts cannot be combined: {0}")]
    Incompatible(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

pub type CipherResult<T> = Result<T, CipherError>;

/// Generate a random prime of exactly `bits` length.
pub(crate) fn gen_prime<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> CipherResult<BigUint> {
    if bits < 8 {
        return Err(CipherError::KeyGeneration(format!(
            "{} bit primes are too small",
            bits
        )));
    }
    loop {
        let mut candidate = rng.gen_biguint(bits);
        // ensure high bit is set and the candidate is odd
        candidate |= BigUint::one() << (bits - 1);
        candidate |= BigUint::one();
        if is_prime(&candidate, Some(PrimalityTestConfig::default())).probably() {
            return Ok(candidate);
        }
    }
}

/// Big integers travel as decimal strings inside documents and key files.
pub(crate) mod decimal {
    use num::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal integer {:?}", s)))
    }

    pub mod option {
        use num::BigUint;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<BigUint>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<BigUint>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] BigUint);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
        }
    }
}
