//! Voxel data structures and operations

pub mod chunk;
pub mod field;
pub mod svo;

pub use chunk::{ChunkMeta, ChunkTable};
pub use field::{ChunkField, FieldSource, TerrainField, TerrainParams};
