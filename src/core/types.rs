//! Core type aliases and re-exports

pub use glam::UVec3;

/// Standard Result type for the builder
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Index of a chunk within the chunk grid
pub type ChunkIndex = UVec3;
