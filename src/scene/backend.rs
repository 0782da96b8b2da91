//! Per-chunk build contract between the orchestrator and a device

use crate::core::types::{ChunkIndex, Result};
use crate::memory::ArenaAllocation;
use crate::voxel::chunk::{ChunkMeta, ChunkTable};

/// Device side of a chunk build.
///
/// The orchestrator calls these in order for each chunk and blocks on each
/// call; an implementation must have finished (and made visible) all work of
/// a call before returning.
pub trait ChunkBackend {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Prepare the metadata table for a new scene build
    fn begin_scene(&mut self, table: &ChunkTable) -> Result<()>;

    /// Reset scratch and control state and record the chunk being written
    fn begin_chunk(&mut self, chunk: ChunkIndex) -> Result<()>;

    /// Construct the field and fragment list of the current chunk
    fn build_fragment_list(&mut self) -> Result<()>;

    /// Fragment count produced by the last `build_fragment_list`
    fn read_fragment_count(&mut self) -> Result<u32>;

    /// Build the octree of the current fragment list
    fn build_octree(&mut self) -> Result<()>;

    /// Octree length in node words produced by the last `build_octree`
    fn read_octree_length(&mut self) -> Result<u32>;

    /// Copy the scratch octree to `allocation` in the arena and write `meta`
    fn commit_chunk(&mut self, allocation: &ArenaAllocation, meta: &ChunkMeta) -> Result<()>;

    /// Arena capacity the backend was created with, in bytes
    fn arena_capacity(&self) -> u64;
}
