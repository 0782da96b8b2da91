//! Sparse voxel octree chunk builder
//!
//! Voxelizes procedural terrain chunk by chunk, builds a sparse octree per
//! chunk (on the GPU with wgpu compute passes, or on the CPU with rayon) and
//! packs the chunk octrees into one arena indexed by a chunk metadata table.

pub mod core;
pub mod memory;
pub mod voxel;
pub mod scene;
pub mod gpu;
