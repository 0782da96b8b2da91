//! Builder configuration
//!
//! Loaded from a JSON file; every field has a default so partial files work.

use std::path::Path;

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{ChunkIndex, Result};
use crate::voxel::field::TerrainParams;
use crate::voxel::svo::fragment::MAX_RESOLUTION;

/// Size of one GiB in bytes
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Default arena capacity (2 GiB)
pub const DEFAULT_ARENA_CAPACITY: u64 = 2 * GIB;

/// Largest arena whose word offsets fit `ChunkMeta::node_offset`.
/// Word `u32::MAX` is never handed out, it marks empty chunks.
pub const MAX_ARENA_CAPACITY: u64 = u32::MAX as u64 * 4;

/// Configuration for a scene build
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Voxels per chunk edge. Power of two in 2..=1024.
    pub chunk_voxel_dim: u32,
    /// Number of chunks along x, y and z.
    pub chunk_dim: [u32; 3],
    /// Total byte capacity of the global octree arena.
    pub arena_capacity_bytes: u64,
    /// Upper bound for a single blocking GPU wait.
    pub wait_timeout_ms: u64,
    /// Procedural terrain used by the field construction pass.
    pub terrain: TerrainParams,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            chunk_voxel_dim: 64,
            chunk_dim: [4, 2, 4],
            arena_capacity_bytes: DEFAULT_ARENA_CAPACITY,
            wait_timeout_ms: 10_000,
            terrain: TerrainParams::default(),
        }
    }
}

impl BuilderConfig {
    /// Load and validate a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: BuilderConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded builder config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Check the invariants the builder relies on
    pub fn validate(&self) -> Result<()> {
        let dim = self.chunk_voxel_dim;
        if !dim.is_power_of_two() || dim < 2 {
            return Err(Error::Config(format!(
                "chunk_voxel_dim must be a power of two >= 2, got {}",
                dim
            )));
        }
        if dim > MAX_RESOLUTION {
            return Err(Error::Config(format!(
                "chunk_voxel_dim {} exceeds the packed coordinate limit {}",
                dim, MAX_RESOLUTION
            )));
        }
        if self.chunk_dim.contains(&0) {
            return Err(Error::Config(format!(
                "chunk_dim must be non-zero on every axis, got {:?}",
                self.chunk_dim
            )));
        }
        if self.checked_chunk_count().is_none() {
            return Err(Error::Config(format!(
                "chunk_dim {:?} holds more chunks than the table can index",
                self.chunk_dim
            )));
        }
        if self.arena_capacity_bytes % 4 != 0 {
            return Err(Error::Config(format!(
                "arena_capacity_bytes must be a multiple of 4, got {}",
                self.arena_capacity_bytes
            )));
        }
        if self.arena_capacity_bytes > MAX_ARENA_CAPACITY {
            return Err(Error::Config(format!(
                "arena_capacity_bytes {} exceeds the addressable limit {}",
                self.arena_capacity_bytes, MAX_ARENA_CAPACITY
            )));
        }
        if self.wait_timeout_ms == 0 {
            return Err(Error::Config("wait_timeout_ms must be non-zero".into()));
        }
        self.terrain.validate()
    }

    /// Number of octree levels per chunk (log2 of the chunk resolution)
    pub fn level_count(&self) -> u32 {
        self.chunk_voxel_dim.trailing_zeros()
    }

    /// Chunk grid dimensions
    pub fn chunks_dim(&self) -> UVec3 {
        UVec3::from_array(self.chunk_dim)
    }

    /// Total number of chunks in the grid. Only meaningful on a validated config.
    pub fn chunk_count(&self) -> u32 {
        self.checked_chunk_count().unwrap_or(u32::MAX)
    }

    fn checked_chunk_count(&self) -> Option<u32> {
        self.chunk_dim.iter().try_fold(1u32, |count, &d| count.checked_mul(d))
    }

    /// Timeout for a single blocking device wait
    pub fn wait_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wait_timeout_ms)
    }

    /// All chunk indices in build order: x innermost, then y, then z
    pub fn chunk_indices(&self) -> impl Iterator<Item = ChunkIndex> + use<> {
        let [dx, dy, dz] = self.chunk_dim;
        (0..dz).flat_map(move |z| {
            (0..dy).flat_map(move |y| (0..dx).map(move |x| UVec3::new(x, y, z)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = BuilderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.level_count(), 6);
        assert_eq!(config.chunk_count(), 32);
    }

    #[test]
    fn test_rejects_bad_resolution() {
        for dim in [0, 1, 3, 48, 2048] {
            let config = BuilderConfig {
                chunk_voxel_dim: dim,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "dim {} should be rejected", dim);
        }
    }

    #[test]
    fn test_rejects_empty_grid() {
        let config = BuilderConfig {
            chunk_dim: [2, 0, 2],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_grid() {
        let config = BuilderConfig {
            chunk_dim: [65536, 65536, 2],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let largest = BuilderConfig {
            chunk_dim: [65535, 65537, 1],
            ..Default::default()
        };
        largest.validate().unwrap();
        assert_eq!(largest.chunk_count(), u32::MAX);
    }

    #[test]
    fn test_arena_capacity_limit() {
        let too_large = BuilderConfig {
            arena_capacity_bytes: 1 << 36,
            ..Default::default()
        };
        assert!(matches!(too_large.validate(), Err(Error::Config(_))));

        let at_limit = BuilderConfig {
            arena_capacity_bytes: MAX_ARENA_CAPACITY,
            ..Default::default()
        };
        at_limit.validate().unwrap();

        // the last word of a full arena stays below the empty marker
        let mut arena = crate::memory::ArenaAllocator::new(MAX_ARENA_CAPACITY);
        arena.allocate(MAX_ARENA_CAPACITY - 4).unwrap();
        let last = arena.allocate(4).unwrap();
        assert_eq!(last.word_offset().unwrap(), u32::MAX - 1);
        assert!(arena.allocate(4).is_err());
    }

    #[test]
    fn test_chunk_order_is_x_innermost() {
        let config = BuilderConfig {
            chunk_dim: [2, 2, 2],
            ..Default::default()
        };
        let order: Vec<UVec3> = config.chunk_indices().collect();
        assert_eq!(order.len(), 8);
        assert_eq!(order[0], UVec3::new(0, 0, 0));
        assert_eq!(order[1], UVec3::new(1, 0, 0));
        assert_eq!(order[2], UVec3::new(0, 1, 0));
        assert_eq!(order[4], UVec3::new(0, 0, 1));
        assert_eq!(order[7], UVec3::new(1, 1, 1));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chunk_voxel_dim": 16, "chunk_dim": [3, 1, 2] }}"#).unwrap();

        let config = BuilderConfig::load(file.path()).unwrap();
        assert_eq!(config.chunk_voxel_dim, 16);
        assert_eq!(config.chunks_dim(), UVec3::new(3, 1, 2));
        assert_eq!(config.arena_capacity_bytes, DEFAULT_ARENA_CAPACITY);
        assert_eq!(config.level_count(), 4);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chunk_voxel_dim": 12 }}"#).unwrap();
        assert!(matches!(BuilderConfig::load(file.path()), Err(Error::Config(_))));
    }
}
