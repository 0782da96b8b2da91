//! Device buffers of the chunk builder
//!
//! Scratch buffers (field, fragment list, chunk octree) are sized once for
//! the configured resolution and reused for every chunk. Control buffers are
//! reset by the host before each chunk.

use bytemuck::{Pod, Zeroable};
use glam::UVec3;

use crate::core::error::Error;
use crate::core::logging::mib;
use crate::core::types::Result;
use crate::voxel::chunk::ChunkMeta;
use crate::voxel::field::TerrainParams;
use crate::voxel::svo::fragment::FragmentEntry;
use crate::voxel::svo::level_builder::worst_case_words;
use crate::voxel::svo::node::CHILDREN_PER_NODE;

/// Fragment count and resolution (8 bytes, matches WGSL `FragmentListInfo`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentListInfo {
    pub voxel_resolution: u32,
    pub voxel_fragment_count: u32,
}

/// Node range processed by the current level (matches WGSL `OctreeBuildInfo`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct OctreeBuildInfo {
    pub alloc_begin: u32,
    pub alloc_num: u32,
    /// Level being built; advanced by `modify_arg`
    pub level: u32,
    pub _pad: u32,
}

impl OctreeBuildInfo {
    /// State at the start of a chunk: the 8 root slots, level 0
    pub const ROOT: OctreeBuildInfo = OctreeBuildInfo {
        alloc_begin: 0,
        alloc_num: CHILDREN_PER_NODE,
        level: 0,
        _pad: 0,
    };
}

/// `dispatch_workgroups_indirect` arguments
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirect {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchIndirect {
    pub const ONE: DispatchIndirect = DispatchIndirect { x: 1, y: 1, z: 1 };
}

/// Grid and current chunk (32 bytes, matches WGSL `ChunksInfo` uniform)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ChunksInfo {
    pub chunks_dim: [u32; 3],
    pub level_count: u32,
    pub writing_chunk: [u32; 3],
    pub resolution: u32,
}

/// Terrain uniform (32 bytes, matches WGSL `TerrainParams`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuTerrainParams {
    pub seed: u32,
    pub base_height: u32,
    pub amplitude: u32,
    pub feature_size: u32,
    pub octaves: u32,
    pub _pad: [u32; 3],
}

impl From<&TerrainParams> for GpuTerrainParams {
    fn from(p: &TerrainParams) -> Self {
        Self {
            seed: p.seed,
            base_height: p.base_height,
            amplitude: p.amplitude,
            feature_size: p.feature_size,
            octaves: p.octaves,
            _pad: [0; 3],
        }
    }
}

/// Byte sizes of the per-chunk scratch buffers for a resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchSizes {
    pub field: u64,
    pub fragment_list: u64,
    pub chunk_octree: u64,
}

impl ScratchSizes {
    pub fn for_resolution(resolution: u32) -> Self {
        let edge = resolution as u64 + 1;
        let cells = (resolution as u64).pow(3);
        Self {
            field: edge * edge * edge * 4,
            fragment_list: cells * std::mem::size_of::<FragmentEntry>() as u64,
            chunk_octree: worst_case_words(resolution) * 4,
        }
    }

    pub fn largest(&self) -> u64 {
        self.field.max(self.fragment_list).max(self.chunk_octree)
    }

    /// Fail when a scratch buffer cannot be bound on this device
    pub fn check(&self, limits: &wgpu::Limits) -> Result<()> {
        let binding_limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if self.largest() > binding_limit {
            return Err(Error::Gpu(format!(
                "scratch buffers need {:.2}MB but the device binds at most {:.2}MB per buffer \
                 (field {:.2}MB, fragment list {:.2}MB, octree {:.2}MB); lower chunk_voxel_dim",
                mib(self.largest()),
                mib(binding_limit),
                mib(self.field),
                mib(self.fragment_list),
                mib(self.chunk_octree)
            )));
        }
        Ok(())
    }

    pub fn log(&self) {
        log::info!(
            "Builder scratch: field {:.2}MB, fragment list {:.2}MB, octree {:.2}MB (worst case)",
            mib(self.field),
            mib(self.fragment_list),
            mib(self.chunk_octree)
        );
    }
}

/// Every buffer the builder pipelines bind
pub struct BuildBuffers {
    pub field: wgpu::Buffer,
    pub terrain: wgpu::Buffer,
    pub fragment_list: wgpu::Buffer,
    pub fragment_list_info: wgpu::Buffer,
    pub chunk_octree: wgpu::Buffer,
    pub counter: wgpu::Buffer,
    pub build_info: wgpu::Buffer,
    pub octree_length: wgpu::Buffer,
    pub chunks_info: wgpu::Buffer,
    pub chunks: wgpu::Buffer,
    pub write_offset: wgpu::Buffer,
    pub tag_args: wgpu::Buffer,
    pub node_args: wgpu::Buffer,
    /// Global octree arena
    pub arena: wgpu::Buffer,
    /// Small MAP_READ buffer for count/length readback
    pub readback: wgpu::Buffer,
    resolution: u32,
    chunks_dim: UVec3,
    level_count: u32,
    arena_capacity: u64,
}

fn storage(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

fn uniform(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn indirect(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<DispatchIndirect>() as u64,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::INDIRECT
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl BuildBuffers {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resolution: u32,
        chunks_dim: UVec3,
        arena_capacity: u64,
        terrain: &TerrainParams,
    ) -> Self {
        let sizes = ScratchSizes::for_resolution(resolution);
        sizes.log();

        let chunk_count = (chunks_dim.x * chunks_dim.y * chunks_dim.z) as u64;
        let table_size = chunk_count * std::mem::size_of::<ChunkMeta>() as u64;

        let buffers = Self {
            field: storage(device, "builder_field", sizes.field),
            terrain: uniform(device, "builder_terrain", std::mem::size_of::<GpuTerrainParams>() as u64),
            fragment_list: storage(device, "fragment_list", sizes.fragment_list),
            fragment_list_info: storage(
                device,
                "fragment_list_info",
                std::mem::size_of::<FragmentListInfo>() as u64,
            ),
            chunk_octree: storage(device, "chunk_octree", sizes.chunk_octree),
            counter: storage(device, "alloc_counter", 4),
            build_info: storage(device, "octree_build_info", std::mem::size_of::<OctreeBuildInfo>() as u64),
            octree_length: storage(device, "octree_length", 4),
            chunks_info: uniform(device, "chunks_info", std::mem::size_of::<ChunksInfo>() as u64),
            chunks: storage(device, "chunk_table", table_size),
            write_offset: uniform(device, "arena_write_offset", 16),
            tag_args: indirect(device, "tag_dispatch_args"),
            node_args: indirect(device, "node_dispatch_args"),
            arena: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("octree_arena"),
                size: arena_capacity,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("builder_readback"),
                size: 8,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            resolution,
            chunks_dim,
            level_count: resolution.trailing_zeros(),
            arena_capacity,
        };

        queue.write_buffer(&buffers.terrain, 0, bytemuck::bytes_of(&GpuTerrainParams::from(terrain)));
        log::info!(
            "Builder arena: {:.2}MB, chunk table: {} entries",
            mib(arena_capacity),
            chunk_count
        );

        buffers
    }

    /// Upload the whole metadata table
    pub fn write_table(&self, queue: &wgpu::Queue, entries: &[ChunkMeta]) {
        queue.write_buffer(&self.chunks, 0, bytemuck::cast_slice(entries));
    }

    /// Reset every control buffer and record the chunk being written
    pub fn reset_control(&self, queue: &wgpu::Queue, chunk: UVec3) {
        let fragment_info = FragmentListInfo {
            voxel_resolution: self.resolution,
            voxel_fragment_count: 0,
        };
        let chunks_info = ChunksInfo {
            chunks_dim: self.chunks_dim.to_array(),
            level_count: self.level_count,
            writing_chunk: chunk.to_array(),
            resolution: self.resolution,
        };

        queue.write_buffer(&self.fragment_list_info, 0, bytemuck::bytes_of(&fragment_info));
        queue.write_buffer(&self.counter, 0, bytemuck::bytes_of(&1u32));
        queue.write_buffer(&self.build_info, 0, bytemuck::bytes_of(&OctreeBuildInfo::ROOT));
        queue.write_buffer(&self.octree_length, 0, bytemuck::bytes_of(&CHILDREN_PER_NODE));
        queue.write_buffer(&self.tag_args, 0, bytemuck::bytes_of(&DispatchIndirect::ONE));
        queue.write_buffer(&self.node_args, 0, bytemuck::bytes_of(&DispatchIndirect::ONE));
        queue.write_buffer(&self.chunks_info, 0, bytemuck::bytes_of(&chunks_info));
    }

    /// Set the arena word offset `finalize_chunk` records
    pub fn write_offset(&self, queue: &wgpu::Queue, word_offset: u32) {
        queue.write_buffer(&self.write_offset, 0, bytemuck::bytes_of(&[word_offset, 0, 0, 0]));
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn chunks_dim(&self) -> UVec3 {
        self.chunks_dim
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn arena_capacity(&self) -> u64 {
        self.arena_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_layouts() {
        assert_eq!(std::mem::size_of::<FragmentListInfo>(), 8);
        assert_eq!(std::mem::size_of::<OctreeBuildInfo>(), 16);
        assert_eq!(std::mem::size_of::<DispatchIndirect>(), 12);
        assert_eq!(std::mem::size_of::<ChunksInfo>(), 32);
        assert_eq!(std::mem::size_of::<GpuTerrainParams>(), 32);
    }

    #[test]
    fn test_scratch_sizes() {
        let sizes = ScratchSizes::for_resolution(2);
        assert_eq!(sizes.field, 27 * 4);
        assert_eq!(sizes.fragment_list, 8 * 8);
        assert_eq!(sizes.chunk_octree, 8 * 4);

        let sizes = ScratchSizes::for_resolution(64);
        assert_eq!(sizes.fragment_list, 64 * 64 * 64 * 8);
        assert_eq!(sizes.largest(), sizes.fragment_list);
    }

    #[test]
    fn test_scratch_check_against_limits() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            max_buffer_size: 1 << 20,
            ..Default::default()
        };
        assert!(ScratchSizes::for_resolution(4).check(&limits).is_ok());
        assert!(ScratchSizes::for_resolution(64).check(&limits).is_err());
    }
}
