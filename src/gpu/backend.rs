//! wgpu implementation of the per-chunk build passes

use crate::core::config::BuilderConfig;
use crate::core::error::Error;
use crate::core::logging::mib;
use crate::core::types::{ChunkIndex, Result};
use crate::gpu::buffers::{BuildBuffers, ScratchSizes};
use crate::gpu::context::GpuContext;
use crate::gpu::pipeline::BuilderPipelines;
use crate::memory::ArenaAllocation;
use crate::scene::backend::ChunkBackend;
use crate::voxel::chunk::{ChunkMeta, ChunkTable};

/// Workgroup edge of the 3D field and voxel passes
const VOLUME_GROUP: u32 = 4;

enum Dispatch<'a> {
    Direct(u32, u32, u32),
    Indirect(&'a wgpu::Buffer),
}

/// Chunk backend running the builder pipelines on a GPU
pub struct GpuBackend {
    ctx: GpuContext,
    buffers: BuildBuffers,
    pipelines: BuilderPipelines,
    state_group: wgpu::BindGroup,
    args_group: wgpu::BindGroup,
    current: Option<ChunkIndex>,
}

impl GpuBackend {
    /// Create a headless device and the builder resources for `config`
    pub fn new(config: &BuilderConfig) -> Result<Self> {
        config.validate()?;
        let ctx = GpuContext::headless(config.wait_timeout())?;
        Self::with_context(ctx, config)
    }

    /// Create the builder resources on an existing device
    pub fn with_context(ctx: GpuContext, config: &BuilderConfig) -> Result<Self> {
        config.validate()?;

        let limits = ctx.limits();
        let resolution = config.chunk_voxel_dim;
        ScratchSizes::for_resolution(resolution).check(&limits)?;

        let mut arena_capacity = config.arena_capacity_bytes;
        if arena_capacity > limits.max_buffer_size {
            // keep the arena word aligned
            let clamped = limits.max_buffer_size & !3;
            log::warn!(
                "Arena capacity {:.2}MB exceeds the device buffer limit, clamping to {:.2}MB",
                mib(arena_capacity),
                mib(clamped)
            );
            arena_capacity = clamped;
        }

        let buffers = BuildBuffers::new(
            &ctx.device,
            &ctx.queue,
            resolution,
            config.chunks_dim(),
            arena_capacity,
            &config.terrain,
        );
        let pipelines = BuilderPipelines::new(&ctx.device);
        let (state_group, args_group) = pipelines.bind_groups(&ctx.device, &buffers);

        Ok(Self {
            ctx,
            buffers,
            pipelines,
            state_group,
            args_group,
            current: None,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Device arena buffer, for consumers binding it directly
    pub fn arena_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.arena
    }

    /// Device metadata table buffer
    pub fn table_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.chunks
    }

    /// Read the metadata table back from the device
    pub fn read_chunk_table(&self) -> Result<ChunkTable> {
        let dims = self.buffers.chunks_dim();
        let count = dims.x as u64 * dims.y as u64 * dims.z as u64;
        let size = count * std::mem::size_of::<ChunkMeta>() as u64;
        let bytes = self.ctx.read_buffer(&self.buffers.chunks, 0, size)?;

        let entries = bytes
            .chunks_exact(std::mem::size_of::<ChunkMeta>())
            .map(bytemuck::pod_read_unaligned::<ChunkMeta>)
            .collect();
        ChunkTable::from_entries(dims, entries)
            .ok_or_else(|| Error::Gpu("chunk table readback size mismatch".into()))
    }

    /// Read `count` arena words starting at word `first`
    pub fn read_arena(&self, first: u32, count: u32) -> Result<Vec<u32>> {
        self.ctx.read_words(&self.buffers.arena, first as u64, count as u64)
    }

    fn current_chunk(&self) -> Result<ChunkIndex> {
        self.current
            .ok_or_else(|| Error::Backend("no chunk in progress, call begin_chunk first".into()))
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Record one pass running `pipeline`. Argument passes also bind group 1.
    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        with_args: bool,
        dispatch: Dispatch,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.state_group, &[]);
        if with_args {
            pass.set_bind_group(1, &self.args_group, &[]);
        }
        match dispatch {
            Dispatch::Direct(x, y, z) => pass.dispatch_workgroups(x, y, z),
            Dispatch::Indirect(args) => pass.dispatch_workgroups_indirect(args, 0),
        }
    }

    fn read_counter(&self) -> Result<u32> {
        let bytes = self.ctx.map_read(&self.buffers.readback, 4)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[..4]))
    }
}

impl ChunkBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn begin_scene(&mut self, table: &ChunkTable) -> Result<()> {
        if table.dims() != self.buffers.chunks_dim() {
            return Err(Error::Backend(format!(
                "table of {} chunks does not match device table of {}",
                table.dims(),
                self.buffers.chunks_dim()
            )));
        }
        self.buffers.write_table(&self.ctx.queue, table.entries());
        self.current = None;
        Ok(())
    }

    fn begin_chunk(&mut self, chunk: ChunkIndex) -> Result<()> {
        self.buffers.reset_control(&self.ctx.queue, chunk);
        self.current = Some(chunk);
        Ok(())
    }

    fn build_fragment_list(&mut self) -> Result<()> {
        self.current_chunk()?;
        let resolution = self.buffers.resolution();
        let field_groups = (resolution + 1).div_ceil(VOLUME_GROUP);
        let voxel_groups = resolution.div_ceil(VOLUME_GROUP);

        let mut encoder = self.encoder("fragment_list_encoder");
        let p = &self.pipelines;
        self.dispatch(
            &mut encoder,
            &p.construct_field,
            false,
            Dispatch::Direct(field_groups, field_groups, field_groups),
        );
        self.dispatch(
            &mut encoder,
            &p.create_voxels,
            false,
            Dispatch::Direct(voxel_groups, voxel_groups, voxel_groups),
        );
        self.dispatch(&mut encoder, &p.chunk_modify_arg, true, Dispatch::Direct(1, 1, 1));

        // voxel_fragment_count is the second word of FragmentListInfo
        encoder.copy_buffer_to_buffer(&self.buffers.fragment_list_info, 4, &self.buffers.readback, 0, 4u64);
        self.ctx.submit_and_wait(encoder)
    }

    fn read_fragment_count(&mut self) -> Result<u32> {
        self.read_counter()
    }

    fn build_octree(&mut self) -> Result<()> {
        self.current_chunk()?;
        let level_count = self.buffers.level_count();

        let mut encoder = self.encoder("octree_encoder");
        let p = &self.pipelines;
        let b = &self.buffers;
        for level in 0..level_count {
            self.dispatch(&mut encoder, &p.init_node, false, Dispatch::Indirect(&b.node_args));
            self.dispatch(&mut encoder, &p.tag_node, false, Dispatch::Indirect(&b.tag_args));

            if level + 1 < level_count {
                self.dispatch(&mut encoder, &p.alloc_node, false, Dispatch::Indirect(&b.node_args));
                self.dispatch(&mut encoder, &p.modify_arg, true, Dispatch::Direct(1, 1, 1));
            }
        }

        encoder.copy_buffer_to_buffer(&b.octree_length, 0, &b.readback, 0, 4u64);
        self.ctx.submit_and_wait(encoder)
    }

    fn read_octree_length(&mut self) -> Result<u32> {
        self.read_counter()
    }

    fn commit_chunk(&mut self, allocation: &ArenaAllocation, meta: &ChunkMeta) -> Result<()> {
        self.current_chunk()?;
        if allocation.end() > self.buffers.arena_capacity() {
            return Err(Error::Capacity {
                requested: allocation.size(),
                available: self.buffers.arena_capacity().saturating_sub(allocation.offset()),
                capacity: self.buffers.arena_capacity(),
            });
        }
        let word_offset = allocation.word_offset()?;
        debug_assert_eq!(meta.node_offset, word_offset);

        self.buffers.write_offset(&self.ctx.queue, word_offset);

        let mut encoder = self.encoder("commit_encoder");
        encoder.copy_buffer_to_buffer(
            &self.buffers.chunk_octree,
            0,
            &self.buffers.arena,
            allocation.offset(),
            allocation.size(),
        );
        self.dispatch(&mut encoder, &self.pipelines.finalize_chunk, false, Dispatch::Direct(1, 1, 1));
        self.ctx.submit_and_wait(encoder)
    }

    fn arena_capacity(&self) -> u64 {
        self.buffers.arena_capacity()
    }
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("resolution", &self.buffers.resolution())
            .field("chunks_dim", &self.buffers.chunks_dim())
            .field("arena_capacity", &self.buffers.arena_capacity())
            .field("current", &self.current)
            .finish()
    }
}
