//! Level-by-level octree construction from a fragment list
//!
//! Host-side version of the GPU octree passes. Each level runs:
//! 1. init  - zero the node slots allocated by the previous level
//! 2. tag   - every fragment descends from the root to the current level and
//!            either writes its leaf or flags the node it lands on
//! 3. alloc - every flagged node reserves 8 contiguous child slots
//!
//! Node words are `AtomicU32` so the tag pass can run across fragments in
//! parallel. The alloc pass hands out child groups in node-index order, which
//! makes the output a pure function of the fragment list.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::Result;

use super::fragment::{FragmentEntry, MAX_RESOLUTION};
use super::node::{
    child_index, child_local, interior_node, is_interior, leaf_node, CHILDREN_PER_NODE,
    NODE_DATA_MASK, SUBDIVIDE_FLAG,
};

/// Builds one chunk octree at a time, reusing its node storage across chunks
pub struct OctreeLevelBuilder {
    resolution: u32,
    level_count: u32,
    nodes: Vec<AtomicU32>,
    /// Allocation cursor in groups of 8 nodes. Group 0 is the root level.
    alloc_counter: u32,
    /// First node slot initialized/allocated in the current level
    alloc_begin: u32,
    /// Number of node slots in the current level
    alloc_num: u32,
    /// Words of the node buffer in use
    octree_length: u32,
}

impl OctreeLevelBuilder {
    /// Create a builder for chunks of `resolution`^3 voxels (power of 2, >= 2)
    pub fn new(resolution: u32) -> Self {
        assert!(resolution.is_power_of_two(), "Resolution must be power of 2");
        assert!(
            (2..=MAX_RESOLUTION).contains(&resolution),
            "Resolution must be in 2..={}",
            MAX_RESOLUTION
        );

        let mut nodes = Vec::with_capacity(CHILDREN_PER_NODE as usize);
        nodes.resize_with(CHILDREN_PER_NODE as usize, || AtomicU32::new(0));

        let mut builder = Self {
            resolution,
            level_count: resolution.trailing_zeros(),
            nodes,
            alloc_counter: 0,
            alloc_begin: 0,
            alloc_num: 0,
            octree_length: 0,
        };
        builder.reset();
        builder
    }

    /// Reset the build cursor for a new chunk. Node storage is kept (and is
    /// stale until the init pass runs over it).
    pub fn reset(&mut self) {
        // the first 8 slots are the root level and are always present
        self.alloc_counter = 1;
        self.alloc_begin = 0;
        self.alloc_num = CHILDREN_PER_NODE;
        self.octree_length = CHILDREN_PER_NODE;
    }

    /// Build the full octree for `fragments`, returning its length in words
    pub fn build(&mut self, fragments: &[FragmentEntry]) -> Result<u32> {
        self.reset();

        for level in 0..self.level_count {
            self.init_level();
            self.tag_level(level, fragments);

            if level + 1 < self.level_count {
                self.alloc_level()?;
                self.modify_args();
            }
        }

        Ok(self.octree_length)
    }

    /// Zero the slots of the current allocation range
    pub fn init_level(&mut self) {
        let range = self.alloc_range();
        self.nodes[range].par_iter().for_each(|node| node.store(0, Ordering::Relaxed));
    }

    /// Descend every fragment to `level` and tag the node it reaches
    pub fn tag_level(&self, level: u32, fragments: &[FragmentEntry]) {
        let is_leaf_level = level + 1 == self.level_count;
        fragments
            .par_iter()
            .for_each(|fragment| self.tag_fragment(level, is_leaf_level, fragment));
    }

    fn tag_fragment(&self, level: u32, is_leaf_level: bool, fragment: &FragmentEntry) {
        let mut coord = fragment.position();
        let mut half = self.resolution / 2;
        let mut index = child_index(coord, half);

        for _ in 0..level {
            let word = self.nodes[index as usize].load(Ordering::Relaxed);
            debug_assert!(is_interior(word), "descent through unallocated node {:#x}", word);

            coord = child_local(coord, half);
            half /= 2;
            index = (word & NODE_DATA_MASK) + child_index(coord, half);
        }

        let node = &self.nodes[index as usize];
        if is_leaf_level {
            node.store(leaf_node(fragment.properties), Ordering::Relaxed);
        } else {
            // exactly one fragment wins 0 -> flag, the rest see it already set
            let _ = node.compare_exchange(0, SUBDIVIDE_FLAG, Ordering::Relaxed, Ordering::Relaxed);
        }
    }

    /// Give every flagged node of the current range 8 child slots.
    /// Returns the number of nodes subdivided.
    ///
    /// Fails without touching the tree when the new child groups would not be
    /// addressable by a 30-bit interior pointer.
    pub fn alloc_level(&mut self) -> Result<u32> {
        let flagged: Vec<usize> = self
            .alloc_range()
            .into_par_iter()
            .filter(|&i| self.nodes[i].load(Ordering::Relaxed) == SUBDIVIDE_FLAG)
            .collect();

        let first_group = self.alloc_counter;
        let required = group_words(first_group as u64 + flagged.len() as u64)? as usize;
        self.alloc_counter += flagged.len() as u32;

        if self.nodes.len() < required {
            self.nodes.resize_with(required, || AtomicU32::new(0));
        }

        let nodes = &self.nodes;
        flagged.par_iter().enumerate().for_each(|(k, &i)| {
            let first_child = (first_group + k as u32) * CHILDREN_PER_NODE;
            nodes[i].store(interior_node(first_child), Ordering::Relaxed);
        });

        Ok(flagged.len() as u32)
    }

    /// Advance the allocation range to the groups reserved by `alloc_level`
    pub fn modify_args(&mut self) {
        self.alloc_begin += self.alloc_num;
        self.alloc_num = self.alloc_counter * CHILDREN_PER_NODE - self.alloc_begin;
        self.octree_length = self.alloc_counter * CHILDREN_PER_NODE;
    }

    /// Slots covered by the current level
    pub fn alloc_range(&self) -> std::ops::Range<usize> {
        self.alloc_begin as usize..(self.alloc_begin + self.alloc_num) as usize
    }

    /// Words of the finished octree
    pub fn words(&self) -> Vec<u32> {
        self.nodes[..self.octree_length as usize]
            .iter()
            .map(|node| node.load(Ordering::Relaxed))
            .collect()
    }

    /// Copy the finished octree into `dst`, which must hold `octree_length` words
    pub fn copy_words_into(&self, dst: &mut [u32]) {
        debug_assert_eq!(dst.len(), self.octree_length as usize);
        dst.par_iter_mut()
            .zip(self.nodes[..self.octree_length as usize].par_iter())
            .for_each(|(d, node)| *d = node.load(Ordering::Relaxed));
    }

    pub fn octree_length(&self) -> u32 {
        self.octree_length
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Node slots currently backed by storage (grows, never shrinks)
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }
}

/// Node words spanned by `groups` child groups. The last group must start at
/// an index an interior node can point to.
fn group_words(groups: u64) -> Result<u32> {
    let words = groups * CHILDREN_PER_NODE as u64;
    if words > NODE_DATA_MASK as u64 + 1 {
        return Err(Error::AddressRange(format!(
            "{} node words exceed the 30-bit child pointer range",
            words
        )));
    }
    Ok(words as u32)
}

/// Upper bound on the node words a chunk octree of `resolution` can use
pub fn worst_case_words(resolution: u32) -> u64 {
    let levels = resolution.trailing_zeros();
    (1..=levels).map(|l| 8u64.pow(l)).sum()
}
