//! Set of meshlet instances already handled this frame, keyed by dense id

use bit_vec::BitVec;

#[derive(Debug, Clone, Default)]
pub struct VisibilityMask {
    bits: BitVec,
}

impl VisibilityMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every bit and size the mask for `len` meshlet instances
    pub fn reset(&mut self, len: usize) {
        self.bits = BitVec::from_elem(len, false);
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn set(&mut self, meshlet_instance: u32) {
        let index = meshlet_instance as usize;
        if index < self.bits.len() {
            self.bits.set(index, true);
        }
    }

    pub fn contains(&self, meshlet_instance: u32) -> bool {
        self.bits.get(meshlet_instance as usize).unwrap_or(false)
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|bit| *bit).count()
    }

    /// Pack into 32-bit words, bit `i % 32` of word `i / 32`, as the GPU mask stores it
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = vec![0u32; self.bits.len().div_ceil(32)];
        for (index, bit) in self.bits.iter().enumerate() {
            if bit {
                words[index / 32] |= 1 << (index % 32);
            }
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_previous_frame() {
        let mut mask = VisibilityMask::new();
        mask.reset(40);
        mask.set(3);
        mask.set(39);
        assert!(mask.contains(3));
        assert_eq!(mask.count_ones(), 2);
        assert_eq!(mask.to_words(), vec![1 << 3, 1 << 7]);

        mask.reset(40);
        assert!(!mask.contains(3));
        assert_eq!(mask.count_ones(), 0);
    }

    #[test]
    fn test_out_of_range_ids_are_ignored() {
        let mut mask = VisibilityMask::new();
        mask.reset(4);
        mask.set(10);
        assert!(!mask.contains(10));
        assert_eq!(mask.count_ones(), 0);
    }
}
