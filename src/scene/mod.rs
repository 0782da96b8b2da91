//! Scene build: the per-chunk orchestrator and its backends

pub mod backend;
pub mod builder;
pub mod cpu;
pub mod timing;

pub use backend::ChunkBackend;
pub use builder::{ChunkOutcome, SceneBuilder, SceneStats};
pub use cpu::CpuBackend;
pub use timing::BuildTimings;
