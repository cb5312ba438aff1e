use crate::primitives::{AesBlock, Prf, PrfKey};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::ZeroizeOnDrop;

#[derive(Debug, ZeroizeOnDrop)]
pub struct Aes128Prf {
    cipher: Aes128,
}

impl Prf for Aes128Prf {
    fn new(key: &PrfKey) -> Self {
        let cipher = Aes128::new(key);
        Self { cipher }
    }

    fn encrypt_all(&self, data: &mut [AesBlock]) {
        self.cipher.encrypt_blocks(data);
    }
}

impl Aes128Prf {
    pub fn from_bytes(key: &[u8; 16]) -> Self {
        Prf::new(PrfKey::from_slice(key))
    }

    /// Evaluates the PRF on a single block and returns the output.
    pub fn eval(&self, input: &AesBlock) -> AesBlock {
        let mut block = *input;
        self.cipher.encrypt_block(&mut block);
        block
    }
}
