//! Arena memory management for packed chunk octrees

pub mod arena;

pub use arena::{ArenaAllocation, ArenaAllocator, ArenaStats, NODE_ALIGNMENT};
