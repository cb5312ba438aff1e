//! Multiplicatively homomorphic ElGamal over `Z_p*`, with optional
//! deterministic and exponential modes.
use crate::cipher::{decimal, gen_prime, CipherError, CipherResult};
use num::bigint::RandBigInt;
use num::{BigUint, One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalPublicKey {
    #[serde(with = "decimal")]
    pub p: BigUint,
    #[serde(with = "decimal")]
    pub alpha: BigUint,
    #[serde(with = "decimal")]
    pub beta: BigUint,
    /// Shared masking value for deterministic encryption.
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub km: Option<BigUint>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ElGamalPrivateKey {
    #[serde(with = "decimal")]
    d: BigUint,
}

impl fmt::Debug for ElGamalPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElGamalPrivateKey").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElGamalKeys {
    pub public: ElGamalPublicKey,
    pub private: ElGamalPrivateKey,
}

/// `(c, ke)`. Deterministic ciphertexts carry no ephemeral key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    #[serde(with = "decimal")]
    pub c: BigUint,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub ke: Option<BigUint>,
}

impl ElGamalKeys {
    pub fn generate<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> CipherResult<Self> {
        let p = gen_prime(bits, rng)?;
        let two = BigUint::from(2u8);
        let alpha = rng.gen_biguint_range(&two, &(&p - BigUint::one()));
        // d in [2, p - 2]
        let d = rng.gen_biguint_range(&two, &(&p - BigUint::one()));
        let beta = alpha.modpow(&d, &p);

        Ok(Self {
            public: ElGamalPublicKey {
                p,
                alpha,
                beta,
                km: None,
            },
            private: ElGamalPrivateKey { d },
        })
    }

    /// Fixes the masking value so equal messages give equal ciphertexts.
    pub fn set_deterministic<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> BigUint {
        let public = &mut self.public;
        let i = rng.gen_biguint_range(&BigUint::from(2u8), &(&public.p - BigUint::one()));
        let km = public.beta.modpow(&i, &public.p);
        public.km = Some(km.clone());
        km
    }
}

impl ElGamalPublicKey {
    /// Modular inverse via Fermat's little theorem; `p` is prime.
    fn modinv(&self, x: &BigUint) -> BigUint {
        x.modpow(&(&self.p - BigUint::from(2u8)), &self.p)
    }

    /// Encrypts a group element `x` in `[1, p)`.
    pub fn encrypt_element<R: RngCore + CryptoRng>(
        &self,
        x: &BigUint,
        rng: &mut R,
    ) -> CipherResult<ElGamalCiphertext> {
        if x.is_zero() || x >= &self.p {
            return Err(CipherError::OutOfRange(format!(
                "{} is not an element of the group",
                x
            )));
        }
        match &self.km {
            Some(km) => Ok(ElGamalCiphertext {
                c: x * km % &self.p,
                ke: None,
            }),
            None => {
                let i = rng.gen_biguint_range(&BigUint::from(2u8), &(&self.p - BigUint::one()));
                let ke = self.alpha.modpow(&i, &self.p);
                let km = self.beta.modpow(&i, &self.p);
                Ok(ElGamalCiphertext {
                    c: x * km % &self.p,
                    ke: Some(ke),
                })
            }
        }
    }

    /// `alpha^m mod p`, inverting for negative exponents.
    pub fn exponentiate(&self, m: i64) -> BigUint {
        let e = BigUint::from(m.unsigned_abs());
        let x = self.alpha.modpow(&e, &self.p);
        if m < 0 {
            self.modinv(&x)
        } else {
            x
        }
    }

    /// Homomorphic multiplication of two probabilistic ciphertexts.
    pub fn combine(
        &self,
        a: &ElGamalCiphertext,
        b: &ElGamalCiphertext,
    ) -> CipherResult<ElGamalCiphertext> {
        match (&a.ke, &b.ke) {
            (Some(ka), Some(kb)) => Ok(ElGamalCiphertext {
                c: &a.c * &b.c % &self.p,
                ke: Some(ka * kb % &self.p),
            }),
            _ => Err(CipherError::Incompatible(
                "deterministic ciphertexts do not combine".into(),
            )),
        }
    }
}

/// Discrete log table for exponential mode: maps `alpha^i` back to `i`.
#[derive(Debug, Clone)]
pub struct LookupTable {
    table: HashMap<BigUint, i64>,
}

impl LookupTable {
    pub fn generate(public: &ElGamalPublicKey, lo: i64, hi: i64) -> Self {
        let table = (lo..=hi).map(|i| (public.exponentiate(i), i)).collect();
        Self { table }
    }

    pub fn get(&self, x: &BigUint) -> Option<i64> {
        self.table.get(x).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ElGamal {
    keys: ElGamalKeys,
    exponential: Option<LookupTable>,
}

impl ElGamal {
    pub fn new(keys: &ElGamalKeys) -> Self {
        Self {
            keys: keys.clone(),
            exponential: None,
        }
    }

    /// Exponential mode: messages are encrypted as `alpha^m`, so combining
    /// ciphertexts adds messages. Decryption is limited to `[lo, hi]`.
    pub fn exponential(keys: &ElGamalKeys, lo: i64, hi: i64) -> Self {
        Self {
            exponential: Some(LookupTable::generate(&keys.public, lo, hi)),
            keys: keys.clone(),
        }
    }

    pub fn public(&self) -> &ElGamalPublicKey {
        &self.keys.public
    }

    pub fn is_exponential(&self) -> bool {
        self.exponential.is_some()
    }

    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        m: i64,
        rng: &mut R,
    ) -> CipherResult<ElGamalCiphertext> {
        let public = &self.keys.public;
        let x = if self.exponential.is_some() {
            public.exponentiate(m)
        } else if m > 0 {
            BigUint::from(m as u64)
        } else {
            return Err(CipherError::OutOfRange(format!(
                "{} is not a positive integer",
                m
            )));
        };
        public.encrypt_element(&x, rng)
    }

    pub fn combine(
        &self,
        a: &ElGamalCiphertext,
        b: &ElGamalCiphertext,
    ) -> CipherResult<ElGamalCiphertext> {
        self.keys.public.combine(a, b)
    }

    /// Recovers the group element `x`.
    pub fn decrypt_element(&self, ct: &ElGamalCiphertext) -> CipherResult<BigUint> {
        let public = &self.keys.public;
        let km = match (&public.km, &ct.ke) {
            (_, Some(ke)) => ke.modpow(&self.keys.private.d, &public.p),
            (Some(km), None) => km.clone(),
            (None, None) => {
                return Err(CipherError::Malformed(
                    "ciphertext has no ephemeral key".into(),
                ))
            }
        };
        if km.is_zero() || ct.c >= public.p {
            return Err(CipherError::Decrypt(
                "ciphertext was not produced under this key".into(),
            ));
        }
        Ok(&ct.c * public.modinv(&km) % &public.p)
    }

    pub fn decrypt(&self, ct: &ElGamalCiphertext) -> CipherResult<i64> {
        let x = self.decrypt_element(ct)?;
        match &self.exponential {
            Some(table) => table.get(&x).ok_or_else(|| {
                CipherError::OutOfRange(format!(
                    "exponent is outside the lookup table of {} entries",
                    table.len()
                ))
            }),
            None => i64::try_from(&x)
                .map_err(|_| CipherError::OutOfRange(format!("{} does not fit in i64", x))),
        }
    }
}
