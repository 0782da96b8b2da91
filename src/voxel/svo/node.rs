//! Sparse Voxel Octree node words
//!
//! Every node is one u32. The top two bits are the type tag:
//! - `00` empty (the whole word is zero)
//! - `01` interior, low 30 bits = chunk-local index of the first of 8 children
//! - `10` flagged for subdivision, waiting for the allocation pass
//! - `11` leaf, low 30 bits = material/color payload

use glam::UVec3;

/// Mask selecting the type tag
pub const NODE_TAG_MASK: u32 = 0xC000_0000;
/// Mask selecting the pointer or payload
pub const NODE_DATA_MASK: u32 = 0x3FFF_FFFF;
/// Tag of an allocated interior node
pub const INTERIOR_TAG: u32 = 0x4000_0000;
/// Sentinel written by the tag pass on a node that needs children
pub const SUBDIVIDE_FLAG: u32 = 0x8000_0000;
/// Tag of a leaf node
pub const LEAF_TAG: u32 = 0xC000_0000;

/// Children of one node are stored contiguously, 8-wide
pub const CHILDREN_PER_NODE: u32 = 8;

/// Decoded form of a node word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Empty,
    Interior { first_child: u32 },
    Flagged,
    Leaf { payload: u32 },
}

impl NodeKind {
    /// Decode a raw node word
    pub fn decode(word: u32) -> Self {
        match word & NODE_TAG_MASK {
            0 if word == 0 => NodeKind::Empty,
            INTERIOR_TAG => NodeKind::Interior { first_child: word & NODE_DATA_MASK },
            SUBDIVIDE_FLAG => NodeKind::Flagged,
            LEAF_TAG => NodeKind::Leaf { payload: word & NODE_DATA_MASK },
            // untagged non-zero words never appear in a finished octree
            _ => NodeKind::Empty,
        }
    }
}

/// Build a leaf word carrying `payload` (truncated to 30 bits)
#[inline]
pub const fn leaf_node(payload: u32) -> u32 {
    LEAF_TAG | (payload & NODE_DATA_MASK)
}

/// Build an interior word pointing at the first of 8 children
#[inline]
pub const fn interior_node(first_child: u32) -> u32 {
    INTERIOR_TAG | (first_child & NODE_DATA_MASK)
}

#[inline]
pub const fn is_leaf(word: u32) -> bool {
    word & NODE_TAG_MASK == LEAF_TAG
}

#[inline]
pub const fn is_interior(word: u32) -> bool {
    word & NODE_TAG_MASK == INTERIOR_TAG
}

/// Octant of `coord` inside a cell whose half extent is `half`:
/// bit 0 = x upper half, bit 1 = y, bit 2 = z.
#[inline]
pub fn child_index(coord: UVec3, half: u32) -> u32 {
    (coord.x >= half) as u32 | ((coord.y >= half) as u32) << 1 | ((coord.z >= half) as u32) << 2
}

/// Coordinate relative to the chosen octant's origin
#[inline]
pub fn child_local(coord: UVec3, half: u32) -> UVec3 {
    UVec3::new(coord.x % half, coord.y % half, coord.z % half)
}
