/*
  Order-preserving translation of signed and floating point numbers into
  unsigned 64 bit integers (and the reverse, used for verifying correctness).

  The resulting integer is the plaintext that is ORE encrypted later on. The
  mapping is such that sorting the mapped integers gives the same order as
  sorting the original numbers. Nothing else about the value is preserved.

  Caveat: NaN and infinities map to integers too, but their ordering relative
  to finite values is not meaningful. Callers reject them before converting.

  Reference: https://lemire.me/blog/2020/12/14/converting-floating-point-numbers-to-integers-while-preserving-order
*/

pub trait ToOrderedInteger<T> {
    fn map_to(&self) -> T;
}

pub trait FromOrderedInteger<T> {
    fn map_from(input: T) -> Self;
}

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

impl ToOrderedInteger<u64> for f64 {
    fn map_to(&self) -> u64 {
        let num: u64 = self.to_bits();
        // All ones for negative numbers, only the sign bit otherwise
        let mask = ((num >> 63) as i64).wrapping_neg() as u64 | SIGN_BIT;
        num ^ mask
    }
}

impl FromOrderedInteger<u64> for f64 {
    fn map_from(input: u64) -> f64 {
        let i = (((input >> 63) as i64) - 1) as u64;
        let mask: u64 = i | SIGN_BIT;
        f64::from_bits(input ^ mask)
    }
}

impl ToOrderedInteger<u64> for i64 {
    fn map_to(&self) -> u64 {
        (*self as u64) ^ SIGN_BIT
    }
}

impl FromOrderedInteger<u64> for i64 {
    fn map_from(input: u64) -> i64 {
        (input ^ SIGN_BIT) as i64
    }
}
