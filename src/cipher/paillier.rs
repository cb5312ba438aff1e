//! Additively homomorphic Paillier encryption with `g = n + 1`.
use crate::cipher::{decimal, gen_prime, CipherError, CipherResult};
use num::bigint::{RandBigInt, Sign};
use num::{BigInt, BigUint, Integer, One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierPublicKey {
    #[serde(with = "decimal")]
    pub n: BigUint,
    #[serde(with = "decimal")]
    pub g: BigUint,
    /// Fixed randomness for deterministic encryption.
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub r: Option<BigUint>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PaillierPrivateKey {
    #[serde(with = "decimal")]
    lambda: BigUint,
    #[serde(with = "decimal")]
    mu: BigUint,
}

impl fmt::Debug for PaillierPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaillierPrivateKey").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaillierKeys {
    pub public: PaillierPublicKey,
    pub private: PaillierPrivateKey,
}

/// A Paillier ciphertext, stored in documents as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaillierCiphertext(#[serde(with = "decimal")] pub BigUint);

impl fmt::Display for PaillierCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PaillierCiphertext {
    type Err = CipherError;

    fn from_str(s: &str) -> CipherResult<Self> {
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(PaillierCiphertext)
            .ok_or_else(|| CipherError::Malformed(format!("{:?} is not a decimal integer", s)))
    }
}

impl PaillierKeys {
    /// Generates a keypair whose modulus `n = p * q` has about `bits` bits.
    pub fn generate<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> CipherResult<Self> {
        loop {
            let p = gen_prime(bits / 2, rng)?;
            let q = gen_prime(bits / 2, rng)?;
            if p == q {
                continue;
            }

            let n = &p * &q;
            let lambda = (&p - BigUint::one()) * (&q - BigUint::one());
            // gcd(n, phi(n)) = 1 is required for g = n + 1 to work
            if !n.gcd(&lambda).is_one() {
                continue;
            }
            let mu = match lambda.modinv(&n) {
                Some(mu) => mu,
                None => continue,
            };
            let g = &n + BigUint::one();

            return Ok(Self {
                public: PaillierPublicKey { n, g, r: None },
                private: PaillierPrivateKey { lambda, mu },
            });
        }
    }

    /// Fixes the encryption randomness so equal messages give equal ciphertexts.
    pub fn set_deterministic<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> BigUint {
        let r = random_unit(&self.public.n, rng);
        self.public.r = Some(r.clone());
        r
    }
}

fn random_unit<R: RngCore + CryptoRng>(n: &BigUint, rng: &mut R) -> BigUint {
    loop {
        let r = rng.gen_biguint_range(&BigUint::one(), n);
        if r.gcd(n).is_one() {
            return r;
        }
    }
}

impl PaillierPublicKey {
    pub fn n_squared(&self) -> BigUint {
        &self.n * &self.n
    }

    pub fn is_deterministic(&self) -> bool {
        self.r.is_some()
    }

    /// Encrypts a signed message with `|m| < n`; negative values wrap mod n.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        m: &BigInt,
        rng: &mut R,
    ) -> CipherResult<PaillierCiphertext> {
        let (sign, magnitude) = m.clone().into_parts();
        if magnitude >= self.n {
            return Err(CipherError::OutOfRange(format!(
                "|{}| is not below the modulus",
                m
            )));
        }
        let n2 = self.n_squared();
        let m_mod = if sign == Sign::Minus && !magnitude.is_zero() {
            &self.n - magnitude
        } else {
            magnitude
        };
        let r = match &self.r {
            Some(r) => r.clone(),
            None => random_unit(&self.n, rng),
        };

        let c = self.g.modpow(&m_mod, &n2) * r.modpow(&self.n, &n2) % &n2;
        Ok(PaillierCiphertext(c))
    }

    /// Homomorphic addition: the result decrypts to `m1 + m2 mod n`.
    pub fn combine(
        &self,
        a: &PaillierCiphertext,
        b: &PaillierCiphertext,
    ) -> CipherResult<PaillierCiphertext> {
        let n2 = self.n_squared();
        self.check(a, &n2)?;
        self.check(b, &n2)?;
        Ok(PaillierCiphertext(&a.0 * &b.0 % &n2))
    }

    /// Homomorphic negation: the result decrypts to `-m mod n`.
    pub fn negate(&self, a: &PaillierCiphertext) -> CipherResult<PaillierCiphertext> {
        let n2 = self.n_squared();
        self.check(a, &n2)?;
        a.0.modinv(&n2)
            .map(PaillierCiphertext)
            .ok_or_else(|| CipherError::Malformed("ciphertext is not invertible".into()))
    }

    fn check(&self, c: &PaillierCiphertext, n2: &BigUint) -> CipherResult<()> {
        if c.0.is_zero() || &c.0 >= n2 {
            return Err(CipherError::Incompatible(
                "ciphertext was not produced under this public key".into(),
            ));
        }
        if !c.0.gcd(&self.n).is_one() {
            return Err(CipherError::Malformed(
                "ciphertext shares a factor with the modulus".into(),
            ));
        }
        Ok(())
    }
}

/// Keypair wrapper used by the dispatcher.
#[derive(Debug, Clone)]
pub struct Paillier {
    keys: PaillierKeys,
}

impl Paillier {
    pub fn new(keys: &PaillierKeys) -> Self {
        Self { keys: keys.clone() }
    }

    pub fn public(&self) -> &PaillierPublicKey {
        &self.keys.public
    }

    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        m: i64,
        rng: &mut R,
    ) -> CipherResult<PaillierCiphertext> {
        self.keys.public.encrypt(&BigInt::from(m), rng)
    }

    pub fn combine(
        &self,
        a: &PaillierCiphertext,
        b: &PaillierCiphertext,
    ) -> CipherResult<PaillierCiphertext> {
        self.keys.public.combine(a, b)
    }

    /// `m = L(c^λ mod n²) · μ mod n`, where `L(u) = (u − 1) / n`
    pub fn decrypt(&self, c: &PaillierCiphertext) -> CipherResult<BigUint> {
        let public = &self.keys.public;
        let n2 = public.n_squared();
        public.check(c, &n2)?;
        let x = c.0.modpow(&self.keys.private.lambda, &n2);
        if x.is_zero() {
            return Err(CipherError::Malformed("ciphertext is not a unit mod n²".into()));
        }
        let l = (&x - BigUint::one()) / &public.n;
        Ok(&l * &self.keys.private.mu % &public.n)
    }

    /// Decrypts, reading values above `n / 2` as negative.
    pub fn decrypt_signed(&self, c: &PaillierCiphertext) -> CipherResult<BigInt> {
        let m = self.decrypt(c)?;
        let n = &self.keys.public.n;
        if m > n >> 1 {
            Ok(BigInt::from(m) - BigInt::from(n.clone()))
        } else {
            Ok(BigInt::from(m))
        }
    }

    pub fn decrypt_i64(&self, c: &PaillierCiphertext) -> CipherResult<i64> {
        let m = self.decrypt_signed(c)?;
        i64::try_from(&m).map_err(|_| CipherError::OutOfRange(format!("{} does not fit in i64", m)))
    }
}
