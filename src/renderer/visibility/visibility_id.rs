//! Packed visibility identifiers

use bytemuck::{Pod, Zeroable};

use crate::constants::packing::{VISIBILITY_EMPTY, VISIBILITY_TRIANGLE_BITS, VISIBILITY_TRIANGLE_MASK};

/// Per-pixel id as stored in the two channels of the visibility target.
///
/// Word 0 is the mesh instance; word 1 packs the absolute meshlet index above
/// an 8-bit triangle index. Both words are `0xFFFF_FFFF` where nothing was drawn.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct VisibilityId {
    pub mesh_instance: u32,
    pub packed: u32,
}

impl VisibilityId {
    pub const EMPTY: Self = Self {
        mesh_instance: VISIBILITY_EMPTY,
        packed: VISIBILITY_EMPTY,
    };

    /// Largest meshlet index representable in word 1
    pub const MAX_MESHLET: u32 = u32::MAX >> VISIBILITY_TRIANGLE_BITS;

    #[inline]
    pub fn new(mesh_instance: u32, meshlet: u32, triangle: u32) -> Self {
        Self {
            mesh_instance,
            packed: meshlet << VISIBILITY_TRIANGLE_BITS | (triangle & VISIBILITY_TRIANGLE_MASK),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mesh_instance == VISIBILITY_EMPTY
    }

    #[inline]
    pub fn meshlet(&self) -> u32 {
        self.packed >> VISIBILITY_TRIANGLE_BITS
    }

    #[inline]
    pub fn triangle(&self) -> u32 {
        self.packed & VISIBILITY_TRIANGLE_MASK
    }

    pub fn from_words(words: [u32; 2]) -> Self {
        Self {
            mesh_instance: words[0],
            packed: words[1],
        }
    }

    pub fn words(&self) -> [u32; 2] {
        [self.mesh_instance, self.packed]
    }
}

impl Default for VisibilityId {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_survive_packing() {
        let id = VisibilityId::new(7, 12_345, 127);
        assert_eq!(id.mesh_instance, 7);
        assert_eq!(id.meshlet(), 12_345);
        assert_eq!(id.triangle(), 127);
        assert!(!id.is_empty());
    }

    #[test]
    fn test_largest_meshlet_does_not_collide_with_empty() {
        let id = VisibilityId::new(0, VisibilityId::MAX_MESHLET, 0);
        assert_eq!(id.meshlet(), VisibilityId::MAX_MESHLET);
        assert_ne!(id, VisibilityId::EMPTY);
        assert!(VisibilityId::default().is_empty());
    }
}
