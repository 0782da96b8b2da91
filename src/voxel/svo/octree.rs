//! Chunk octree container and host-side traversal
//!
//! A chunk octree is a flat run of node words. The first 8 words are the
//! root level; interior pointers are relative to the chunk's first word, so
//! the same traversal works on a scratch buffer (base 0) and on the arena
//! (base = the chunk's node offset).

use glam::UVec3;

use super::node::{child_index, child_local, NodeKind, CHILDREN_PER_NODE};

/// Descend to the leaf holding `coord`, returning its payload.
///
/// `base` is the word index of the chunk's root level inside `words`.
/// Returns `None` for empty space or out-of-range pointers.
pub fn lookup(words: &[u32], base: u32, resolution: u32, coord: UVec3) -> Option<u32> {
    if coord.max_element() >= resolution {
        return None;
    }

    let mut half = resolution / 2;
    let mut local = coord;
    let mut index = base as usize + child_index(local, half) as usize;

    loop {
        let word = *words.get(index)?;
        match NodeKind::decode(word) {
            NodeKind::Leaf { payload } => return Some(payload),
            NodeKind::Interior { first_child } if half > 1 => {
                local = child_local(local, half);
                half /= 2;
                index = base as usize + first_child as usize + child_index(local, half) as usize;
            }
            _ => return None,
        }
    }
}

/// A finished chunk octree held on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOctree {
    words: Vec<u32>,
    resolution: u32,
}

impl ChunkOctree {
    pub fn new(words: Vec<u32>, resolution: u32) -> Self {
        debug_assert!(words.len() >= CHILDREN_PER_NODE as usize);
        Self { words, resolution }
    }

    /// Payload of the voxel at `coord`, if occupied
    pub fn voxel_at(&self, coord: UVec3) -> Option<u32> {
        lookup(&self.words, 0, self.resolution, coord)
    }

    /// Visit every leaf with its chunk-local coordinate
    pub fn iterate_leaves<F: FnMut(UVec3, u32)>(&self, mut callback: F) {
        self.visit_group(0, UVec3::ZERO, self.resolution / 2, &mut callback);
    }

    fn visit_group<F: FnMut(UVec3, u32)>(&self, first: u32, origin: UVec3, half: u32, callback: &mut F) {
        for child in 0..CHILDREN_PER_NODE {
            let offset = UVec3::new(child & 1, (child >> 1) & 1, (child >> 2) & 1) * half;
            let Some(&word) = self.words.get((first + child) as usize) else {
                return;
            };
            match NodeKind::decode(word) {
                NodeKind::Leaf { payload } => callback(origin + offset, payload),
                NodeKind::Interior { first_child } if half > 1 => {
                    self.visit_group(first_child, origin + offset, half / 2, callback)
                }
                _ => {}
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.words
            .iter()
            .filter(|&&w| matches!(NodeKind::decode(w), NodeKind::Leaf { .. }))
            .count()
    }

    /// Number of node words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::svo::fragment::FragmentEntry;
    use crate::voxel::svo::level_builder::OctreeLevelBuilder;
    use crate::voxel::svo::node::leaf_node;

    #[test]
    fn test_lookup_with_base_offset() {
        // a resolution-2 octree placed 5 words into a larger buffer
        let mut words = vec![0u32; 13];
        words[5 + 7] = leaf_node(0x2A);

        assert_eq!(lookup(&words, 5, 2, UVec3::new(1, 1, 1)), Some(0x2A));
        assert_eq!(lookup(&words, 5, 2, UVec3::new(0, 1, 1)), None);
        assert_eq!(lookup(&words, 5, 2, UVec3::new(2, 0, 0)), None);
    }

    #[test]
    fn test_lookup_truncated_buffer() {
        let words = vec![0u32; 4];
        assert_eq!(lookup(&words, 0, 2, UVec3::new(1, 1, 1)), None);
    }

    #[test]
    fn test_iterate_leaves() {
        let fragments = [
            FragmentEntry::new(UVec3::new(0, 0, 0), 1),
            FragmentEntry::new(UVec3::new(7, 3, 5), 2),
            FragmentEntry::new(UVec3::new(4, 4, 4), 3),
        ];
        let mut builder = OctreeLevelBuilder::new(8);
        builder.build(&fragments).unwrap();
        let octree = ChunkOctree::new(builder.words(), 8);

        let mut leaves = Vec::new();
        octree.iterate_leaves(|coord, payload| leaves.push((coord, payload)));
        leaves.sort_by_key(|(_, p)| *p);

        assert_eq!(
            leaves,
            vec![
                (UVec3::new(0, 0, 0), 1),
                (UVec3::new(7, 3, 5), 2),
                (UVec3::new(4, 4, 4), 3),
            ]
        );
        assert_eq!(octree.leaf_count(), 3);
        assert_eq!(octree.voxel_at(UVec3::new(7, 3, 5)), Some(2));
        assert_eq!(octree.voxel_at(UVec3::new(7, 3, 4)), None);
    }
}
