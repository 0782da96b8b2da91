//! Sparse Voxel Octree construction

pub mod node;
pub mod fragment;
pub mod level_builder;
pub mod octree;

pub use node::NodeKind;
pub use fragment::FragmentEntry;
pub use level_builder::OctreeLevelBuilder;
pub use octree::{lookup, ChunkOctree};
