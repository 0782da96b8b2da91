//! Host-memory chunk backend
//!
//! Runs the same passes as the GPU pipelines (field, fragment emission,
//! octree init/tag/alloc, arena copy) on rayon, with the arena held as a
//! growable word vector.

use crate::core::config::BuilderConfig;
use crate::core::error::Error;
use crate::core::types::{ChunkIndex, Result};
use crate::memory::{ArenaAllocation, NODE_ALIGNMENT};
use crate::scene::backend::ChunkBackend;
use crate::voxel::chunk::{ChunkMeta, ChunkTable};
use crate::voxel::field::{ChunkField, FieldSource, TerrainField};
use crate::voxel::svo::fragment::FragmentEntry;
use crate::voxel::svo::level_builder::OctreeLevelBuilder;
use crate::voxel::svo::octree::ChunkOctree;

/// Chunk backend running entirely in host memory
pub struct CpuBackend {
    source: Box<dyn FieldSource>,
    arena_capacity: u64,
    field: ChunkField,
    fragments: Vec<FragmentEntry>,
    octree: OctreeLevelBuilder,
    /// Arena contents; grows up to `arena_capacity` as chunks are committed
    arena: Vec<u32>,
    table: ChunkTable,
    current: Option<ChunkIndex>,
}

impl CpuBackend {
    /// Create a backend sampling `source` for every chunk field
    pub fn new(config: &BuilderConfig, source: Box<dyn FieldSource>) -> Result<Self> {
        config.validate()?;
        let resolution = config.chunk_voxel_dim;

        Ok(Self {
            source,
            arena_capacity: config.arena_capacity_bytes,
            field: ChunkField::new(resolution),
            fragments: Vec::new(),
            octree: OctreeLevelBuilder::new(resolution),
            arena: Vec::new(),
            table: ChunkTable::new(config.chunks_dim()),
            current: None,
        })
    }

    /// Create a backend using the configured procedural terrain
    pub fn with_terrain(config: &BuilderConfig) -> Result<Self> {
        let terrain = TerrainField::new(config.terrain.clone());
        Self::new(config, Box::new(terrain))
    }

    fn current_chunk(&self) -> Result<ChunkIndex> {
        self.current
            .ok_or_else(|| Error::Backend("no chunk in progress, call begin_chunk first".into()))
    }

    /// Arena words written so far
    pub fn arena_words(&self) -> &[u32] {
        &self.arena
    }

    /// Metadata table as written by committed chunks
    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    /// Fragment list of the chunk currently being built
    pub fn fragments(&self) -> &[FragmentEntry] {
        &self.fragments
    }

    /// Copy of the scratch octree of the chunk currently being built
    pub fn scratch_octree(&self) -> ChunkOctree {
        ChunkOctree::new(self.octree.words(), self.octree.resolution())
    }
}

impl ChunkBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn begin_scene(&mut self, table: &ChunkTable) -> Result<()> {
        self.table = table.clone();
        self.arena.clear();
        self.current = None;
        Ok(())
    }

    fn begin_chunk(&mut self, chunk: ChunkIndex) -> Result<()> {
        self.fragments.clear();
        self.octree.reset();
        self.current = Some(chunk);
        Ok(())
    }

    fn build_fragment_list(&mut self) -> Result<()> {
        let chunk = self.current_chunk()?;
        self.field.construct(self.source.as_ref(), chunk);
        self.field.create_fragments(&mut self.fragments);
        Ok(())
    }

    fn read_fragment_count(&mut self) -> Result<u32> {
        Ok(self.fragments.len() as u32)
    }

    fn build_octree(&mut self) -> Result<()> {
        self.current_chunk()?;
        self.octree.build(&self.fragments)?;
        Ok(())
    }

    fn read_octree_length(&mut self) -> Result<u32> {
        Ok(self.octree.octree_length())
    }

    fn commit_chunk(&mut self, allocation: &ArenaAllocation, meta: &ChunkMeta) -> Result<()> {
        let chunk = self.current_chunk()?;
        let length = self.octree.octree_length() as usize;

        if allocation.size() != length as u64 * NODE_ALIGNMENT {
            return Err(Error::Backend(format!(
                "allocation of {} bytes does not match octree length of {} words",
                allocation.size(),
                length
            )));
        }
        if allocation.end() > self.arena_capacity {
            return Err(Error::Capacity {
                requested: allocation.size(),
                available: self.arena_capacity.saturating_sub(allocation.offset()),
                capacity: self.arena_capacity,
            });
        }

        let start = allocation.word_offset()? as usize;
        let end = start + length;
        if self.arena.len() < end {
            self.arena.resize(end, 0);
        }
        self.octree.copy_words_into(&mut self.arena[start..end]);
        self.table.set(chunk, *meta);
        Ok(())
    }

    fn arena_capacity(&self) -> u64 {
        self.arena_capacity
    }
}
