use crate::cipher::{CipherError, CipherResult};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[serde(with = "hex::serde")]
    key: [u8; 32],
}

impl SymmetricKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        Self { key }
    }

    /// Derives the key as the SHA-256 digest of a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        Self { key }
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey").finish_non_exhaustive()
    }
}

/// AES-256-CBC with a random IV per call and PKCS#7 padding.
///
/// Ciphertexts are hex strings of `iv || ct`. There is no authentication tag:
/// a ciphertext decrypted under the wrong key either fails unpadding or yields
/// garbage.
#[derive(Debug, Clone)]
pub struct SymmetricCipher {
    key: SymmetricKey,
}

impl SymmetricCipher {
    pub fn new(key: &SymmetricKey) -> Self {
        Self { key: key.clone() }
    }

    pub fn encrypt<R: RngCore + CryptoRng>(&self, plaintext: &[u8], rng: &mut R) -> String {
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);
        let ct = Aes256CbcEnc::new(&self.key.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_LEN + ct.len());
        out.extend_from_slice(&iv);
        out.extend(ct);
        hex::encode(out)
    }

    pub fn decrypt(&self, ciphertext: &str) -> CipherResult<Vec<u8>> {
        let data = hex::decode(ciphertext).map_err(|e| CipherError::Malformed(e.to_string()))?;
        if data.len() < IV_LEN * 2 || data.len() % IV_LEN != 0 {
            return Err(CipherError::Malformed(format!(
                "ciphertext of {} bytes is not an IV plus whole blocks",
                data.len()
            )));
        }
        let (iv, ct) = data.split_at(IV_LEN);
        let mut iv_block = [0u8; IV_LEN];
        iv_block.copy_from_slice(iv);

        Aes256CbcDec::new(&self.key.key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ct)
            .map_err(|_| CipherError::Decrypt("invalid padding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn cipher() -> SymmetricCipher {
        SymmetricCipher::new(&SymmetricKey::from_passphrase("winter is coming"))
    }

    #[test]
    fn roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let c = cipher();
        for message in [&b""[..], b"Jon Snow", &[0u8; 48]] {
            let ct = c.encrypt(message, &mut rng);
            assert_eq!(c.decrypt(&ct).unwrap(), message);
        }
    }

    #[test]
    fn random_iv() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let c = cipher();
        assert_ne!(c.encrypt(b"Arya", &mut rng), c.encrypt(b"Arya", &mut rng));
    }

    #[test]
    fn passphrase_is_deterministic() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let ct = cipher().encrypt(b"Sansa", &mut rng);
        assert_eq!(cipher().decrypt(&ct).unwrap(), b"Sansa");
    }

    #[test]
    fn malformed_ciphertext() {
        let c = cipher();
        assert!(matches!(c.decrypt("zz"), Err(CipherError::Malformed(_))));
        assert!(matches!(c.decrypt("00ff"), Err(CipherError::Malformed(_))));
    }

    #[test]
    fn wrong_key_does_not_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let ct = cipher().encrypt(b"Tyrion Lannister", &mut rng);
        let other = SymmetricCipher::new(&SymmetricKey::from_passphrase("the north remembers"));
        match other.decrypt(&ct) {
            Ok(plaintext) => assert_ne!(plaintext, b"Tyrion Lannister"),
            Err(e) => assert!(matches!(e, CipherError::Decrypt(_))),
        }
    }
}
