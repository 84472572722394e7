use serde::{Deserialize, Serialize};

/// Fixed-width bit sequence.
///
/// Used both for the per-message presence bitvector (one bit per optional
/// field) and as the in-memory representation of bit-string packet fields
/// (flag sets addressed by index). Bits are packed LSB-first within each
/// byte; a width of zero occupies zero bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitVector {
    width: usize,
    bytes: Vec<u8>,
}

impl BitVector {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            bytes: vec![0u8; (width + 7) / 8],
        }
    }

    pub fn from_bytes(width: usize, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), (width + 7) / 8);
        Self { width, bytes }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear_all(&mut self) {
        for byte in &mut self.bytes {
            *byte = 0;
        }
    }

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.width);
        self.bytes[index / 8] |= 1 << (index % 8);
    }

    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.width);
        self.bytes[index / 8] &= !(1 << (index % 8));
    }

    pub fn assign(&mut self, index: usize, value: bool) {
        if value {
            self.set(index);
        } else {
            self.clear(index);
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        debug_assert!(index < self.width);
        self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn any_set(&self) -> bool {
        self.bytes.iter().any(|b| *b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_test() {
        let mut bv = BitVector::new(10);

        assert!(!bv.is_set(0));
        assert!(!bv.is_set(9));

        bv.set(0);
        bv.set(9);

        assert!(bv.is_set(0));
        assert!(bv.is_set(9));
        assert!(!bv.is_set(5));
        assert!(bv.any_set());
    }

    #[test]
    fn test_clear_all() {
        let mut bv = BitVector::new(16);
        bv.set(3);
        bv.set(15);

        bv.clear_all();

        assert!(!bv.any_set());
    }

    #[test]
    fn test_byte_len_rounds_up() {
        assert_eq!(BitVector::new(0).byte_len(), 0);
        assert_eq!(BitVector::new(1).byte_len(), 1);
        assert_eq!(BitVector::new(8).byte_len(), 1);
        assert_eq!(BitVector::new(9).byte_len(), 2);
    }

    #[test]
    fn test_bitwise_equality() {
        let mut a = BitVector::new(12);
        let mut b = BitVector::new(12);

        a.set(7);
        assert_ne!(a, b);

        b.set(7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lsb_first_packing() {
        let mut bv = BitVector::new(9);
        bv.set(0);
        bv.set(8);

        assert_eq!(bv.as_bytes(), &[0x01, 0x01]);
    }
}
