//! Compact binary encoding for ORE ciphertexts, so a left token can travel as
//! a query parameter and right ciphertexts can be stored as raw bytes.

use crate::ore::{
    LeftBlock, OreCiphertext, OreError, OreLeft, OreParams, OreResult, OreRight, RightBlock,
};
use crate::primitives::NONCE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CtType {
    Left = 0,
    Right = 1,
}

impl TryFrom<u8> for CtType {
    type Error = OreError;

    fn try_from(value: u8) -> OreResult<Self> {
        match value {
            0 => Ok(CtType::Left),
            1 => Ok(CtType::Right),
            other => Err(OreError::Parse(format!("unknown ciphertext type {}", other))),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub scheme: u8,
    pub ct_type: CtType,
    pub block_bits: u8,
    pub num_blocks: u8,
}

impl Header {
    pub const HEADER_LEN: usize = 6;
    const VERSION: u16 = 1;
    const SCHEME_BLOCK_ORE_Z3: u8 = 3;

    fn new(ct_type: CtType, params: &OreParams) -> Self {
        Self {
            version: Self::VERSION,
            scheme: Self::SCHEME_BLOCK_ORE_Z3,
            ct_type,
            block_bits: params.block_bits() as u8,
            num_blocks: params.num_blocks() as u8,
        }
    }

    /// Indicates if this ciphertext header is comparable to another.
    /// Version, scheme and parameters must match and the types must be left/right.
    pub fn comparable(&self, other: &Header) -> bool {
        self.version == other.version
            && self.scheme == other.scheme
            && self.block_bits == other.block_bits
            && self.num_blocks == other.num_blocks
            && self.ct_type == CtType::Left
            && other.ct_type == CtType::Right
    }

    fn params(&self) -> OreResult<OreParams> {
        OreParams::new(
            self.block_bits as u32 * self.num_blocks as u32,
            self.block_bits as u32,
        )
    }

    fn to_vec(&self) -> Vec<u8> {
        let mut hdr: Vec<u8> = Vec::with_capacity(Self::HEADER_LEN);
        hdr.extend(self.version.to_be_bytes());
        hdr.push(self.scheme);
        hdr.push(self.ct_type as u8);
        hdr.push(self.block_bits);
        hdr.push(self.num_blocks);
        hdr
    }

    pub fn from_slice(hdr: &[u8]) -> OreResult<Self> {
        if hdr.len() < Self::HEADER_LEN {
            return Err(OreError::Parse(format!(
                "header needs {} bytes, got {}",
                Self::HEADER_LEN,
                hdr.len()
            )));
        }
        let version = u16::from_be_bytes([hdr[0], hdr[1]]);
        if version != Self::VERSION {
            return Err(OreError::Parse(format!("unsupported version {}", version)));
        }
        let scheme = hdr[2];
        if scheme != Self::SCHEME_BLOCK_ORE_Z3 {
            return Err(OreError::Parse(format!("unsupported scheme {}", scheme)));
        }

        Ok(Self {
            version,
            scheme,
            ct_type: CtType::try_from(hdr[3])?,
            block_bits: hdr[4],
            num_blocks: hdr[5],
        })
    }

    fn expect(&self, ct_type: CtType) -> OreResult<()> {
        if self.ct_type != ct_type {
            return Err(OreError::Parse(format!(
                "expected a {:?} ciphertext, got {:?}",
                ct_type, self.ct_type
            )));
        }
        Ok(())
    }
}

const LEFT_BLOCK_LEN: usize = 17;

impl OreLeft {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Header::new(CtType::Left, &self.params).to_vec();
        out.reserve(self.blocks.len() * LEFT_BLOCK_LEN);
        for block in &self.blocks {
            out.extend_from_slice(&block.key);
            out.push(block.index);
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> OreResult<Self> {
        let header = Header::from_slice(data)?;
        header.expect(CtType::Left)?;
        let params = header.params()?;
        let body = &data[Header::HEADER_LEN..];
        if body.len() != params.num_blocks() * LEFT_BLOCK_LEN {
            return Err(OreError::Parse(format!(
                "left ciphertext body is {} bytes, expected {}",
                body.len(),
                params.num_blocks() * LEFT_BLOCK_LEN
            )));
        }

        let blocks = body
            .chunks_exact(LEFT_BLOCK_LEN)
            .map(|chunk| {
                let mut key = [0u8; 16];
                key.copy_from_slice(&chunk[0..16]);
                LeftBlock {
                    key,
                    index: chunk[16],
                }
            })
            .collect();

        Ok(Self { params, blocks })
    }
}

impl OreRight {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Header::new(CtType::Right, &self.params).to_vec();
        out.extend_from_slice(&self.nonce);
        for block in &self.blocks {
            out.extend_from_slice(block.as_bytes());
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> OreResult<Self> {
        let header = Header::from_slice(data)?;
        header.expect(CtType::Right)?;
        let params = header.params()?;
        let block_len = params.right_block_len();
        let body = &data[Header::HEADER_LEN..];
        let expected = NONCE_SIZE + params.num_blocks() * block_len;
        if body.len() != expected {
            return Err(OreError::Parse(format!(
                "right ciphertext body is {} bytes, expected {}",
                body.len(),
                expected
            )));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&body[..NONCE_SIZE]);
        let blocks = body[NONCE_SIZE..]
            .chunks_exact(block_len)
            .map(|chunk| RightBlock(chunk.to_vec()))
            .collect();

        Ok(Self {
            params,
            nonce,
            blocks,
        })
    }
}

impl OreCiphertext {
    /// Left bytes followed by right bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.left.to_bytes();
        out.extend(self.right.to_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> OreResult<Self> {
        let header = Header::from_slice(data)?;
        header.expect(CtType::Left)?;
        let split = Header::HEADER_LEN + header.num_blocks as usize * LEFT_BLOCK_LEN;
        if data.len() < split {
            return Err(OreError::Parse("combined ciphertext is truncated".into()));
        }
        let left = OreLeft::from_bytes(&data[..split])?;
        let right = OreRight::from_bytes(&data[split..])?;
        if left.params != right.params {
            return Err(OreError::CiphertextMismatch(
                "combined ciphertext halves use different parameters".into(),
            ));
        }
        Ok(Self { left, right })
    }
}

/// Compares serialized left and right ciphertexts without decoding the
/// caller's structures first.
pub fn compare_raw_slices(left: &[u8], right: &[u8]) -> OreResult<std::cmp::Ordering> {
    let lh = Header::from_slice(left)?;
    let rh = Header::from_slice(right)?;
    if !lh.comparable(&rh) {
        return Err(OreError::CiphertextMismatch(format!(
            "headers {:?} and {:?} are not comparable",
            lh, rh
        )));
    }
    OreLeft::from_bytes(left)?.compare(&OreRight::from_bytes(right)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let params = OreParams::new(32, 8).unwrap();
        let header = Header::new(CtType::Left, &params);
        let bytes = header.to_vec();
        assert_eq!(bytes.len(), Header::HEADER_LEN);
        assert_eq!(header, Header::from_slice(&bytes).unwrap());
    }

    #[test]
    fn test_header_with_ignored_trailing_bytes() {
        let params = OreParams::new(16, 4).unwrap();
        let header = Header::new(CtType::Right, &params);
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend(header.to_vec());
        bytes.extend(vec![1, 2, 3, 4]);
        assert_eq!(header, Header::from_slice(&bytes).unwrap());
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(
            Header::from_slice(&[0, 1, 3]),
            Err(OreError::Parse(_))
        ));
    }

    #[test]
    fn test_comparable() {
        let params = OreParams::new(32, 8).unwrap();
        let other = OreParams::new(64, 8).unwrap();
        let left = Header::new(CtType::Left, &params);
        let right = Header::new(CtType::Right, &params);
        assert!(left.comparable(&right));
        assert!(!right.comparable(&left));
        assert!(!left.comparable(&Header::new(CtType::Right, &other)));
    }

    #[test]
    fn test_unknown_type() {
        let mut bytes = Header::new(CtType::Left, &OreParams::default()).to_vec();
        bytes[3] = 7;
        assert!(Header::from_slice(&bytes).is_err());
    }
}
