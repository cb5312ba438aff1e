/*
 * Block ORE implementation using a mod-3 comparison residue per slot
 */

use crate::ore::{
    LeftBlock, OreCiphertext, OreKey, OreLeft, OreParams, OreResult, OreRight, RightBlock,
};
use crate::primitives::{
    hash::Aes128Z3Hash, prf::Aes128Prf, prp::KnuthShufflePrp, AesBlock, Hash, Prf, Prp,
    NONCE_SIZE,
};
use rand::{CryptoRng, RngCore};
use std::cmp::Ordering;

#[derive(Debug)]
pub struct OreCipher {
    params: OreParams,
    prf: Aes128Prf,
    prp_prf: Aes128Prf,
}

/* Residue encoding of cmp(a, b): 0 when equal, 1 when greater, 2 (= -1 mod 3) when less */
#[inline]
fn cmp(a: u8, b: u8) -> u8 {
    match a.cmp(&b) {
        Ordering::Equal => 0,
        Ordering::Greater => 1,
        Ordering::Less => 2,
    }
}

/* Block number followed by the prefix value, both big endian */
#[inline]
fn make_block(i: usize, value: u64) -> AesBlock {
    let mut block = AesBlock::default();
    block[0..8].copy_from_slice(&(i as u64).to_be_bytes());
    block[8..16].copy_from_slice(&value.to_be_bytes());
    block
}

impl OreCipher {
    pub fn init(key: &OreKey, params: OreParams) -> OreResult<Self> {
        Ok(Self {
            params,
            prf: Aes128Prf::from_bytes(&key.prf_key),
            prp_prf: Aes128Prf::from_bytes(&key.prp_key),
        })
    }

    pub fn params(&self) -> OreParams {
        self.params
    }

    fn block_prp(&self, i: usize, prefix: u64) -> OreResult<KnuthShufflePrp> {
        let prp_key = self.prp_prf.eval(&make_block(i, prefix));
        Ok(KnuthShufflePrp::new(&prp_key, self.params.domain_size())?)
    }

    pub fn encrypt_left(&self, x: u64) -> OreResult<OreLeft> {
        self.params.check(x)?;
        let k = self.params.block_bits();

        let blocks = (0..self.params.num_blocks())
            .map(|i| {
                let prefix = self.params.prefix(x, i);
                let prp = self.block_prp(i, prefix)?;
                let index = prp.permute(self.params.block(x, i))?;
                let token = self.prf.eval(&make_block(i, prefix << k | index as u64));
                let mut key = [0u8; 16];
                key.copy_from_slice(&token);
                Ok(LeftBlock { key, index })
            })
            .collect::<OreResult<Vec<_>>>()?;

        Ok(OreLeft {
            params: self.params,
            blocks,
        })
    }

    pub fn encrypt_right<R: RngCore + CryptoRng>(&self, y: u64, rng: &mut R) -> OreResult<OreRight> {
        self.params.check(y)?;
        let k = self.params.block_bits();
        let slots = self.params.domain_size();

        // Generate a 16-byte random nonce
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);
        let hasher = Aes128Z3Hash::from_nonce(&nonce);

        let mut blocks = Vec::with_capacity(self.params.num_blocks());
        for i in 0..self.params.num_blocks() {
            let prefix = self.params.prefix(y, i);
            let prp = self.block_prp(i, prefix)?;
            let target = self.params.block(y, i);

            /*
             * The output of F in H(F(k1, y|i-1||j), r) for every slot j
             */
            let mut ro_keys: Vec<AesBlock> = (0..slots)
                .map(|j| make_block(i, prefix << k | j as u64))
                .collect();
            self.prf.encrypt_all(&mut ro_keys);
            let hashes = hasher.hash_all(&mut ro_keys);

            let mut block = RightBlock::with_slots(slots);
            for (j, h) in hashes.iter().enumerate() {
                let jstar = prp.invert(j as u8)?;
                block.set(j, (cmp(jstar, target) + h) % 3);
            }
            blocks.push(block);
        }

        Ok(OreRight {
            params: self.params,
            nonce,
            blocks,
        })
    }

    pub fn encrypt<R: RngCore + CryptoRng>(&self, x: u64, rng: &mut R) -> OreResult<OreCiphertext> {
        Ok(OreCiphertext {
            left: self.encrypt_left(x)?,
            right: self.encrypt_right(x, rng)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use quickcheck::{quickcheck, TestResult};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn init_ore(params: OreParams) -> OreCipher {
        let key = OreKey::new(
            hex!("00010203 04050607 08090a0b 0c0d0e0f"),
            hex!("d0d007a5 3f9a6848 83bc1f21 0f6595a3"),
        );
        OreCipher::init(&key, params).unwrap()
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    fn check_order(ore: &OreCipher, x: u64, y: u64) -> bool {
        let mut rng = rng();
        let a = ore.encrypt(x, &mut rng).unwrap();
        let b = ore.encrypt(y, &mut rng).unwrap();

        match x.cmp(&y) {
            Ordering::Greater => a > b && b < a,
            Ordering::Less => a < b && b > a,
            Ordering::Equal => a == b && a.left.compare(&b.right).unwrap() == Ordering::Equal,
        }
    }

    quickcheck! {
        fn compare_64(x: u64, y: u64) -> bool {
            let ore = init_ore(OreParams::new(64, 8).unwrap());
            check_order(&ore, x, y)
        }

        fn compare_32(x: u32, y: u32) -> bool {
            let ore = init_ore(OreParams::default());
            check_order(&ore, x as u64, y as u64)
        }

        fn compare_16_by_4(x: u16, y: u16) -> bool {
            let ore = init_ore(OreParams::new(16, 4).unwrap());
            check_order(&ore, x as u64, y as u64)
        }

        fn compare_small_domain(x: u8, y: u8) -> TestResult {
            let ore = init_ore(OreParams::small(6).unwrap());
            if x > 63 || y > 63 {
                return TestResult::discard();
            }
            TestResult::from_bool(check_order(&ore, x as u64, y as u64))
        }

        fn equality_32(x: u32) -> bool {
            let ore = init_ore(OreParams::default());
            let mut rng = rng();
            let a = ore.encrypt(x as u64, &mut rng).unwrap();
            let b = ore.encrypt(x as u64, &mut rng).unwrap();
            a == b && a.left.compare(&b.right).unwrap() == Ordering::Equal
        }
    }

    #[test]
    fn smallest_to_largest() {
        let ore = init_ore(OreParams::new(64, 8).unwrap());
        let mut rng = rng();
        let a = ore.encrypt(0, &mut rng).unwrap();
        let b = ore.encrypt(u64::MAX, &mut rng).unwrap();

        assert!(a < b);
    }

    #[test]
    fn largest_to_smallest() {
        let ore = init_ore(OreParams::new(64, 8).unwrap());
        let mut rng = rng();
        let a = ore.encrypt(u64::MAX, &mut rng).unwrap();
        let b = ore.encrypt(0, &mut rng).unwrap();

        assert!(a > b);
    }

    #[test]
    fn comparisons_in_first_block() {
        let ore = init_ore(OreParams::default());
        let mut rng = rng();
        let a = ore.encrypt(0xff00_0000, &mut rng).unwrap();
        let b = ore.encrypt(0xfe00_0000, &mut rng).unwrap();

        assert!(a > b);
        assert!(b < a);
    }

    #[test]
    fn comparisons_in_last_block() {
        let ore = init_ore(OreParams::default());
        let mut rng = rng();
        let a = ore.encrypt(10, &mut rng).unwrap();
        let b = ore.encrypt(73, &mut rng).unwrap();

        assert!(a < b);
        assert!(b > a);
    }

    #[test]
    fn left_is_deterministic_right_is_not() {
        let ore = init_ore(OreParams::default());
        let mut rng = rng();
        assert_eq!(ore.encrypt_left(35).unwrap(), ore.encrypt_left(35).unwrap());
        assert_ne!(
            ore.encrypt_right(35, &mut rng).unwrap(),
            ore.encrypt_right(35, &mut rng).unwrap()
        );
    }

    #[test]
    fn out_of_range_plaintext() {
        let ore = init_ore(OreParams::new(8, 4).unwrap());
        assert!(ore.encrypt_left(256).is_err());
        assert!(ore.encrypt_right(1000, &mut rng()).is_err());
    }

    #[test]
    fn mismatched_params() {
        let small = init_ore(OreParams::new(16, 8).unwrap());
        let large = init_ore(OreParams::default());
        let left = small.encrypt_left(5).unwrap();
        let right = large.encrypt_right(5, &mut rng()).unwrap();

        assert!(matches!(
            left.compare(&right),
            Err(crate::ore::OreError::CiphertextMismatch(_))
        ));
        assert_eq!(left.partial_cmp(&right), None);
    }

    #[test]
    fn truncated_right_ciphertext() {
        let ore = init_ore(OreParams::default());
        let left = ore.encrypt_left(5).unwrap();
        let mut right = ore.encrypt_right(5, &mut rng()).unwrap();
        right.blocks.pop();

        assert!(left.compare(&right).is_err());
    }

    #[test]
    fn bytes_roundtrip_preserves_order() {
        let ore = init_ore(OreParams::default());
        let mut rng = rng();
        let a = ore.encrypt(100, &mut rng).unwrap();
        let b = ore.encrypt(100983, &mut rng).unwrap();

        let left = OreLeft::from_bytes(&a.left.to_bytes()).unwrap();
        let right = OreRight::from_bytes(&b.right.to_bytes()).unwrap();
        assert_eq!(left.compare(&right).unwrap(), Ordering::Less);

        let combined = OreCiphertext::from_bytes(&b.to_bytes()).unwrap();
        assert_eq!(combined.right, b.right);
        assert_eq!(
            crate::ore::format::compare_raw_slices(&b.left.to_bytes(), &a.right.to_bytes())
                .unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn from_bytes_rejects_wrong_type() {
        let ore = init_ore(OreParams::default());
        let ct = ore.encrypt(1, &mut rng()).unwrap();
        assert!(OreLeft::from_bytes(&ct.right.to_bytes()).is_err());
        assert!(OreRight::from_bytes(&ct.left.to_bytes()).is_err());
    }

    #[test]
    fn json_roundtrip() {
        let ore = init_ore(OreParams::default());
        let ct = ore.encrypt(42, &mut rng()).unwrap();
        let json = serde_json::to_string(&ct.right).unwrap();
        let right: OreRight = serde_json::from_str(&json).unwrap();
        assert_eq!(ct.left.compare(&right).unwrap(), Ordering::Equal);
    }
}
