use crate::primitives::{AesBlock, Hash, HashKey};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::ZeroizeOnDrop;

#[derive(ZeroizeOnDrop)]
pub struct Aes128Z3Hash {
    cipher: Aes128,
}

#[inline]
fn reduce(block: &AesBlock) -> u8 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&block[0..8]);
    (u64::from_be_bytes(word) % 3) as u8
}

/*
 * Models a Random Oracle in Z3 by encrypting a data block with AES
 * (keyed by the nonce) and reducing the first 64 bits mod 3.
 */
impl Hash for Aes128Z3Hash {
    fn new(key: &HashKey) -> Self {
        let cipher = Aes128::new(key);
        Self { cipher }
    }

    fn hash(&self, data: &AesBlock) -> u8 {
        let mut output = *data;
        self.cipher.encrypt_block(&mut output);
        reduce(&output)
    }

    /* Hashes all data blocks in place, returning one residue per block */
    fn hash_all(&self, data: &mut [AesBlock]) -> Vec<u8> {
        self.cipher.encrypt_blocks(data);
        data.iter().map(reduce).collect()
    }
}

impl Aes128Z3Hash {
    pub fn from_nonce(nonce: &[u8; 16]) -> Self {
        Hash::new(HashKey::from_slice(nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn init_hash() -> Aes128Z3Hash {
        let key: [u8; 16] = hex!("00010203 04050607 08090a0b 0c0d0e0f");
        Aes128Z3Hash::from_nonce(&key)
    }

    #[test]
    fn hash_is_a_residue() {
        let hash = init_hash();
        for i in 0..=255u8 {
            let input = AesBlock::clone_from_slice(&[i; 16]);
            assert!(hash.hash(&input) < 3);
        }
    }

    #[test]
    fn hash_all_matches_single() {
        let hash = init_hash();
        let inputs: Vec<AesBlock> = (0..32u8)
            .map(|i| AesBlock::clone_from_slice(&[i; 16]))
            .collect();
        let expected: Vec<u8> = inputs.iter().map(|b| hash.hash(b)).collect();

        let mut batch = inputs.clone();
        assert_eq!(expected, hash.hash_all(&mut batch));
    }

    #[test]
    fn different_nonces_give_different_streams() {
        let a = init_hash();
        let b = Aes128Z3Hash::from_nonce(&hex!("d0d007a5 3f9a6848 83bc1f21 0f6595a3"));
        let mut inputs: Vec<AesBlock> = (0..64u8)
            .map(|i| AesBlock::clone_from_slice(&[i; 16]))
            .collect();
        let mut copy = inputs.clone();

        assert_ne!(a.hash_all(&mut inputs), b.hash_all(&mut copy));
    }
}
