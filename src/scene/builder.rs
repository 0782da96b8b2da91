//! Scene build orchestration
//!
//! Walks the chunk grid in order, drives a [`ChunkBackend`] through the
//! per-chunk passes and packs every non-empty chunk octree into the arena.

use std::time::Instant;

use crate::core::config::BuilderConfig;
use crate::core::error::BuildStage;
use crate::core::types::{ChunkIndex, Result};
use crate::memory::{ArenaAllocator, ArenaStats, NODE_ALIGNMENT};
use crate::scene::backend::ChunkBackend;
use crate::scene::timing::BuildTimings;
use crate::voxel::chunk::{ChunkMeta, ChunkTable};

/// Result of building one chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// No occupied voxels; no arena space used
    Empty,
    /// Octree committed to the arena
    Committed { fragments: u32, meta: ChunkMeta },
}

/// Summary of a full scene build
#[derive(Clone, Debug)]
pub struct SceneStats {
    pub chunk_count: u32,
    pub non_empty_chunks: u32,
    pub total_fragments: u64,
    pub arena: ArenaStats,
    pub timings: BuildTimings,
}

/// Builds every chunk of the grid into one arena
pub struct SceneBuilder<B: ChunkBackend> {
    config: BuilderConfig,
    backend: B,
    allocator: ArenaAllocator,
    table: ChunkTable,
}

impl<B: ChunkBackend> SceneBuilder<B> {
    pub fn new(config: BuilderConfig, backend: B) -> Result<Self> {
        config.validate()?;

        // the backend's arena may be smaller than requested (device limits)
        let capacity = config.arena_capacity_bytes.min(backend.arena_capacity());
        let table = ChunkTable::new(config.chunks_dim());

        log::info!(
            "Scene builder ({}): {} chunks of {}^3 voxels, {} levels, arena {:.2}MB",
            backend.name(),
            config.chunk_count(),
            config.chunk_voxel_dim,
            config.level_count(),
            crate::core::logging::mib(capacity)
        );

        Ok(Self {
            config,
            backend,
            allocator: ArenaAllocator::new(capacity),
            table,
        })
    }

    /// Rebuild the whole scene from arena offset 0
    pub fn build_scene(&mut self) -> Result<SceneStats> {
        self.allocator.reset();
        self.table.reset();
        self.backend.begin_scene(&self.table)?;

        let mut timings = BuildTimings::new();
        let mut non_empty_chunks = 0;
        let mut total_fragments = 0u64;

        for chunk in self.config.chunk_indices() {
            let start = Instant::now();
            let outcome = self.build_chunk(chunk)?;
            timings.record(start.elapsed());

            if let ChunkOutcome::Committed { fragments, .. } = outcome {
                non_empty_chunks += 1;
                total_fragments += fragments as u64;
            }
        }

        timings.log();
        self.allocator.log_stats();

        Ok(SceneStats {
            chunk_count: self.config.chunk_count(),
            non_empty_chunks,
            total_fragments,
            arena: self.allocator.stats(),
            timings,
        })
    }

    /// Build and commit a single chunk. Errors carry the chunk and stage.
    pub fn build_chunk(&mut self, chunk: ChunkIndex) -> Result<ChunkOutcome> {
        let backend = &mut self.backend;

        backend
            .begin_chunk(chunk)
            .map_err(|e| e.in_chunk(chunk, BuildStage::Reset))?;
        backend
            .build_fragment_list()
            .map_err(|e| e.in_chunk(chunk, BuildStage::FragmentList))?;
        let fragments = backend
            .read_fragment_count()
            .map_err(|e| e.in_chunk(chunk, BuildStage::Readback))?;

        if fragments == 0 {
            log::trace!("Chunk {} is empty, skipping", chunk);
            self.table.set(chunk, ChunkMeta::EMPTY);
            return Ok(ChunkOutcome::Empty);
        }

        backend
            .build_octree()
            .map_err(|e| e.in_chunk(chunk, BuildStage::Octree))?;
        let length = backend
            .read_octree_length()
            .map_err(|e| e.in_chunk(chunk, BuildStage::Readback))?;

        let allocation = self
            .allocator
            .allocate(length as u64 * NODE_ALIGNMENT)
            .map_err(|e| e.in_chunk(chunk, BuildStage::Allocate))?;
        let word_offset = allocation
            .word_offset()
            .map_err(|e| e.in_chunk(chunk, BuildStage::Allocate))?;
        let meta = ChunkMeta::new(word_offset, length, self.config.level_count());

        log::debug!(
            "Chunk {}: {} fragments, {} node words at byte offset {}",
            chunk,
            fragments,
            length,
            allocation.offset()
        );

        self.backend
            .commit_chunk(&allocation, &meta)
            .map_err(|e| e.in_chunk(chunk, BuildStage::Commit))?;
        self.table.set(chunk, meta);

        Ok(ChunkOutcome::Committed { fragments, meta })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Host copy of the chunk metadata table
    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    pub fn allocator(&self) -> &ArenaAllocator {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::memory::ArenaAllocation;
    use crate::scene::cpu::CpuBackend;
    use crate::voxel::field::FieldSource;
    use crate::voxel::svo::node::{LEAF_TAG, NodeKind};
    use glam::UVec3;

    fn config(resolution: u32, chunks: [u32; 3], capacity: u64) -> BuilderConfig {
        BuilderConfig {
            chunk_voxel_dim: resolution,
            chunk_dim: chunks,
            arena_capacity_bytes: capacity,
            ..Default::default()
        }
    }

    fn builder(
        config: BuilderConfig,
        source: impl FieldSource + 'static,
    ) -> SceneBuilder<CpuBackend> {
        let backend = CpuBackend::new(&config, Box::new(source)).unwrap();
        SceneBuilder::new(config, backend).unwrap()
    }

    /// Forwards to a CpuBackend and counts the octree passes it is asked to run
    struct CountingBackend {
        inner: CpuBackend,
        octree_builds: u32,
        commits: u32,
    }

    impl ChunkBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn begin_scene(&mut self, table: &ChunkTable) -> Result<()> {
            self.inner.begin_scene(table)
        }

        fn begin_chunk(&mut self, chunk: ChunkIndex) -> Result<()> {
            self.inner.begin_chunk(chunk)
        }

        fn build_fragment_list(&mut self) -> Result<()> {
            self.inner.build_fragment_list()
        }

        fn read_fragment_count(&mut self) -> Result<u32> {
            self.inner.read_fragment_count()
        }

        fn build_octree(&mut self) -> Result<()> {
            self.octree_builds += 1;
            self.inner.build_octree()
        }

        fn read_octree_length(&mut self) -> Result<u32> {
            self.inner.read_octree_length()
        }

        fn commit_chunk(&mut self, allocation: &ArenaAllocation, meta: &ChunkMeta) -> Result<()> {
            self.commits += 1;
            self.inner.commit_chunk(allocation, meta)
        }

        fn arena_capacity(&self) -> u64 {
            self.inner.arena_capacity()
        }
    }

    #[test]
    fn test_single_voxel_chunk() {
        let source = |w: UVec3| if w == UVec3::ONE { 0x2Au32 } else { 0 };
        let mut b = builder(config(2, [1, 1, 1], 1024), source);

        let stats = b.build_scene().unwrap();
        assert_eq!(stats.non_empty_chunks, 1);
        assert_eq!(stats.total_fragments, 1);
        assert_eq!(stats.arena.used_bytes, 32);

        let meta = *b.table().get(UVec3::ZERO).unwrap();
        assert_eq!(meta, ChunkMeta::new(0, 8, 1));

        let arena = b.backend().arena_words();
        assert_eq!(&arena[..8], &[0, 0, 0, 0, 0, 0, 0, LEAF_TAG | 0x2A]);
    }

    #[test]
    fn test_full_chunk() {
        let mut b = builder(config(2, [1, 1, 1], 1024), |_: UVec3| 7u32);
        b.build_scene().unwrap();

        let arena = b.backend().arena_words();
        assert_eq!(arena.len(), 8);
        assert!(arena.iter().all(|&w| w == LEAF_TAG | 7));
    }

    #[test]
    fn test_empty_chunk_skips_allocator() {
        let mut b = builder(config(2, [1, 1, 1], 1024), |_: UVec3| 0u32);
        let stats = b.build_scene().unwrap();

        assert_eq!(stats.non_empty_chunks, 0);
        assert_eq!(stats.arena.used_bytes, 0);
        assert_eq!(stats.arena.allocation_count, 0);
        assert!(b.table().get(UVec3::ZERO).unwrap().is_empty());
        assert!(b.backend().arena_words().is_empty());
    }

    #[test]
    fn test_empty_chunks_never_reach_octree_pass() {
        // only chunk (1,0,0) of the 3x1x1 grid has geometry
        let source = |w: UVec3| -> u32 { u32::from(w.x >= 2 && w.x < 4) };
        let config = config(2, [3, 1, 1], 1024);
        let inner = CpuBackend::new(&config, Box::new(source)).unwrap();
        let backend = CountingBackend {
            inner,
            octree_builds: 0,
            commits: 0,
        };
        let mut b = SceneBuilder::new(config, backend).unwrap();

        let stats = b.build_scene().unwrap();
        assert_eq!(stats.non_empty_chunks, 1);
        assert_eq!(b.backend().octree_builds, 1);
        assert_eq!(b.backend().commits, 1);

        assert_eq!(b.build_chunk(UVec3::ZERO).unwrap(), ChunkOutcome::Empty);
        assert_eq!(b.backend().octree_builds, 1);
    }

    #[test]
    fn test_backend_table_matches_host_table() {
        // a mix of empty and non-empty chunks
        let source = |w: UVec3| -> u32 { u32::from(w.y == 0 && (w.x + w.z) % 3 != 0) * 4 };
        let mut b = builder(config(4, [3, 2, 2], 1 << 16), source);
        b.build_scene().unwrap();

        let table = b.table();
        assert!(table.non_empty_count() > 0);
        assert!(table.non_empty_count() < table.entries().len());
        assert_eq!(b.backend().table(), table);

        // a rebuild starts both tables from scratch again
        b.build_scene().unwrap();
        assert_eq!(b.backend().table(), b.table());
    }

    #[test]
    fn test_empty_world() {
        let mut b = builder(config(4, [3, 2, 2], 4096), |_: UVec3| 0u32);
        let stats = b.build_scene().unwrap();

        assert_eq!(stats.chunk_count, 12);
        assert_eq!(stats.timings.count(), 12);
        assert_eq!(stats.arena.used_bytes, 0);
        assert!(b.table().entries().iter().all(|m| *m == ChunkMeta::EMPTY));
    }

    #[test]
    fn test_chunks_pack_contiguously() {
        // chunk (1,0,0) of a 2x1x1 grid holds a floor, chunk (0,0,0) a single voxel
        let source = |w: UVec3| -> u32 {
            if w == UVec3::new(1, 2, 3) {
                9
            } else if w.x >= 4 && w.y == 0 {
                5
            } else {
                0
            }
        };
        let mut b = builder(config(4, [2, 1, 1], 1 << 16), source);
        b.build_scene().unwrap();

        let first = *b.table().get(UVec3::new(0, 0, 0)).unwrap();
        let second = *b.table().get(UVec3::new(1, 0, 0)).unwrap();
        assert!(!first.is_empty() && !second.is_empty());
        assert_eq!(first.node_offset, 0);
        assert_eq!(second.node_offset, first.node_count);
        assert_eq!(first.level_count, 2);

        // every written voxel is reachable through the table
        let arena = b.backend().arena_words();
        assert_eq!(b.table().voxel_at(arena, UVec3::ZERO, 4, UVec3::new(1, 2, 3)), Some(9));
        assert_eq!(b.table().voxel_at(arena, UVec3::ZERO, 4, UVec3::new(1, 2, 2)), None);
        for z in 0..4 {
            for x in 0..4 {
                let local = UVec3::new(x, 0, z);
                assert_eq!(b.table().voxel_at(arena, UVec3::X, 4, local), Some(5));
                assert_eq!(b.table().voxel_at(arena, UVec3::X, 4, local + UVec3::Y), None);
            }
        }
    }

    #[test]
    fn test_chunk_order_is_x_innermost() {
        let mut b = builder(config(2, [2, 2, 2], 1 << 16), |_: UVec3| 1u32);
        b.build_scene().unwrap();

        let offsets: Vec<u32> = b.table().entries().iter().map(|m| m.node_offset).collect();
        // table is x + y*dx + z*dx*dy, so build order matches table order
        assert_eq!(offsets, vec![0, 8, 16, 24, 32, 40, 48, 56]);
    }

    #[test]
    fn test_rebuild_starts_from_zero() {
        let mut b = builder(config(2, [2, 1, 1], 1024), |_: UVec3| 3u32);
        let first = b.build_scene().unwrap();
        let second = b.build_scene().unwrap();

        assert_eq!(first.arena.used_bytes, second.arena.used_bytes);
        assert_eq!(second.arena.generation, first.arena.generation + 1);
        assert_eq!(b.table().get(UVec3::X).unwrap().node_offset, 8);
    }

    #[test]
    fn test_capacity_failure_reports_chunk() {
        // each full 2^3 chunk needs 32 bytes; the third does not fit
        let mut b = builder(config(2, [3, 1, 1], 64), |_: UVec3| 1u32);
        let err = b.build_scene().unwrap_err();

        assert!(err.is_capacity());
        match err {
            Error::Chunk { chunk, stage, .. } => {
                assert_eq!(chunk, UVec3::new(2, 0, 0));
                assert_eq!(stage, BuildStage::Allocate);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(b.allocator().used(), 64);
    }

    #[test]
    fn test_committed_nodes_are_resolved() {
        let source = |w: UVec3| ((w.x ^ w.y ^ w.z) & 1) * 0x11;
        let mut b = builder(config(8, [1, 1, 1], 1 << 20), source);
        b.build_scene().unwrap();

        let meta = *b.table().get(UVec3::ZERO).unwrap();
        let words = &b.backend().arena_words()[meta.word_range()];
        assert!(words.iter().all(|&w| !matches!(NodeKind::decode(w), NodeKind::Flagged)));
        for &w in words {
            if let NodeKind::Interior { first_child } = NodeKind::decode(w) {
                assert!(first_child % 8 == 0 && first_child + 8 <= meta.node_count);
            }
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = config(3, [1, 1, 1], 1024);
        assert!(CpuBackend::new(&bad, Box::new(|_: UVec3| 0u32)).is_err());
    }
}
