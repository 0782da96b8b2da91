//! GPU chunk builder: wgpu context, buffers, pipelines and backend

pub mod backend;
pub mod buffers;
pub mod context;
pub mod pipeline;

pub use backend::GpuBackend;
pub use buffers::{BuildBuffers, ScratchSizes};
pub use context::GpuContext;
pub use pipeline::BuilderPipelines;
