//! Fragment list entries
//!
//! A fragment is one occupied voxel: its chunk-local coordinate packed into
//! 3 x 10 bits plus a properties word (material/color).

use bytemuck::{Pod, Zeroable};
use glam::UVec3;

/// Bits per packed coordinate axis
pub const COORD_BITS: u32 = 10;
/// Largest chunk resolution expressible with packed coordinates
pub const MAX_RESOLUTION: u32 = 1 << COORD_BITS;

const COORD_MASK: u32 = MAX_RESOLUTION - 1;

/// One occupied voxel (8 bytes, matches WGSL `FragmentEntry`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentEntry {
    /// x | y << 10 | z << 20
    pub coord: u32,
    /// Material/color payload
    pub properties: u32,
}

impl FragmentEntry {
    pub fn new(coord: UVec3, properties: u32) -> Self {
        Self {
            coord: pack_coord(coord),
            properties,
        }
    }

    /// Unpacked chunk-local coordinate
    pub fn position(&self) -> UVec3 {
        unpack_coord(self.coord)
    }
}

/// Pack a chunk-local coordinate (each axis < 1024)
#[inline]
pub fn pack_coord(coord: UVec3) -> u32 {
    debug_assert!(coord.max_element() < MAX_RESOLUTION);
    (coord.x & COORD_MASK) | (coord.y & COORD_MASK) << COORD_BITS | (coord.z & COORD_MASK) << (2 * COORD_BITS)
}

/// Inverse of [`pack_coord`]
#[inline]
pub fn unpack_coord(packed: u32) -> UVec3 {
    UVec3::new(
        packed & COORD_MASK,
        (packed >> COORD_BITS) & COORD_MASK,
        (packed >> (2 * COORD_BITS)) & COORD_MASK,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<FragmentEntry>(), 8);
    }

    #[test]
    fn test_packing_layout() {
        assert_eq!(pack_coord(UVec3::new(1, 1, 1)), 1 | 1 << 10 | 1 << 20);
        assert_eq!(pack_coord(UVec3::new(1023, 0, 0)), 0x3FF);
        assert_eq!(pack_coord(UVec3::new(0, 0, 1023)), 0x3FF << 20);

        let entry = FragmentEntry::new(UVec3::new(7, 300, 1023), 0x2A);
        assert_eq!(entry.position(), UVec3::new(7, 300, 1023));
        assert_eq!(entry.properties, 0x2A);
    }
}
