//! Chunk metadata table
//!
//! Maps every chunk of the grid to where its octree lives in the arena. This
//! is the indirection layer the tracer reads before descending an octree.

use bytemuck::{Pod, Zeroable};
use glam::UVec3;

use crate::core::types::ChunkIndex;
use crate::voxel::svo::octree::lookup;

/// `ChunkMeta::flags` bit set on chunks with geometry
pub const CHUNK_NON_EMPTY: u32 = 1;

/// Node offset stored for chunks without an octree
pub const EMPTY_NODE_OFFSET: u32 = u32::MAX;

/// Per-chunk metadata for the GPU (16 bytes, matches WGSL `ChunkMeta`)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct ChunkMeta {
    /// Word index of the chunk's root level in the arena
    pub node_offset: u32,
    /// Node words used by the chunk's octree
    pub node_count: u32,
    /// Octree levels (log2 of the chunk resolution)
    pub level_count: u32,
    /// CHUNK_NON_EMPTY or 0
    pub flags: u32,
}

impl ChunkMeta {
    /// Marker for a chunk with no occupied voxels
    pub const EMPTY: ChunkMeta = ChunkMeta {
        node_offset: EMPTY_NODE_OFFSET,
        node_count: 0,
        level_count: 0,
        flags: 0,
    };

    pub fn new(node_offset: u32, node_count: u32, level_count: u32) -> Self {
        Self {
            node_offset,
            node_count,
            level_count,
            flags: CHUNK_NON_EMPTY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags & CHUNK_NON_EMPTY == 0
    }

    /// Arena word range covered by this chunk
    pub fn word_range(&self) -> std::ops::Range<usize> {
        if self.is_empty() {
            return 0..0;
        }
        let start = self.node_offset as usize;
        start..start + self.node_count as usize
    }
}

impl Default for ChunkMeta {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Metadata for every chunk of the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTable {
    dims: UVec3,
    entries: Vec<ChunkMeta>,
}

impl ChunkTable {
    /// All-empty table for a grid of `dims` chunks
    pub fn new(dims: UVec3) -> Self {
        Self {
            dims,
            entries: vec![ChunkMeta::EMPTY; entry_count(dims)],
        }
    }

    /// Table over existing entries (e.g. read back from the device).
    /// Returns None when the entry count does not match `dims`.
    pub fn from_entries(dims: UVec3, entries: Vec<ChunkMeta>) -> Option<Self> {
        if entries.len() != entry_count(dims) {
            return None;
        }
        Some(Self { dims, entries })
    }

    /// Mark every chunk empty again
    pub fn reset(&mut self) {
        self.entries.fill(ChunkMeta::EMPTY);
    }

    /// Flat index: x + y * dim.x + z * dim.x * dim.y
    pub fn linear_index(&self, chunk: ChunkIndex) -> usize {
        debug_assert!(chunk.cmplt(self.dims).all(), "chunk {} outside grid {}", chunk, self.dims);
        (chunk.x + chunk.y * self.dims.x + chunk.z * self.dims.x * self.dims.y) as usize
    }

    pub fn get(&self, chunk: ChunkIndex) -> Option<&ChunkMeta> {
        if !chunk.cmplt(self.dims).all() {
            return None;
        }
        self.entries.get(self.linear_index(chunk))
    }

    pub fn set(&mut self, chunk: ChunkIndex, meta: ChunkMeta) {
        let index = self.linear_index(chunk);
        self.entries[index] = meta;
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn entries(&self) -> &[ChunkMeta] {
        &self.entries
    }

    pub fn non_empty_count(&self) -> usize {
        self.entries.iter().filter(|m| !m.is_empty()).count()
    }

    /// Total node words referenced by the table
    pub fn total_node_words(&self) -> u64 {
        self.entries.iter().map(|m| m.node_count as u64).sum()
    }

    /// Payload of the voxel at `local` inside `chunk`, looked up through the arena.
    /// Empty chunks never touch the arena.
    pub fn voxel_at(&self, arena: &[u32], chunk: ChunkIndex, resolution: u32, local: UVec3) -> Option<u32> {
        let meta = self.get(chunk)?;
        if meta.is_empty() {
            return None;
        }
        let words = arena.get(meta.word_range())?;
        lookup(words, 0, resolution, local)
    }
}

fn entry_count(dims: UVec3) -> usize {
    dims.x as usize * dims.y as usize * dims.z as usize
}
