//! Compute pipelines of the chunk builder

use crate::gpu::buffers::BuildBuffers;

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// All builder entry points plus their bind group layouts.
///
/// Group 0 holds the build state. Group 1 holds the indirect argument
/// buffers and is only part of the argument passes' layout, so a pass that
/// dispatches indirectly never binds its argument buffer as storage.
pub struct BuilderPipelines {
    pub construct_field: wgpu::ComputePipeline,
    pub create_voxels: wgpu::ComputePipeline,
    pub chunk_modify_arg: wgpu::ComputePipeline,
    pub init_node: wgpu::ComputePipeline,
    pub tag_node: wgpu::ComputePipeline,
    pub alloc_node: wgpu::ComputePipeline,
    pub modify_arg: wgpu::ComputePipeline,
    pub finalize_chunk: wgpu::ComputePipeline,
    state_layout: wgpu::BindGroupLayout,
    args_layout: wgpu::BindGroupLayout,
}

impl BuilderPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("svo_builder_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/svo_builder.wgsl").into()),
        });

        let state_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("builder_state_layout"),
            entries: &[
                storage_entry(0), // field
                uniform_entry(1), // terrain
                storage_entry(2), // fragment_list
                storage_entry(3), // fragment_list_info
                storage_entry(4), // chunk_octree
                storage_entry(5), // counter
                storage_entry(6), // build_info
                storage_entry(7), // octree_length
                uniform_entry(8), // chunks_info
                storage_entry(9), // chunks
                uniform_entry(10), // write_offset
            ],
        });

        let args_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("builder_args_layout"),
            entries: &[
                storage_entry(0), // tag_args
                storage_entry(1), // node_args
            ],
        });

        let pass_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("builder_pass_layout"),
            bind_group_layouts: &[&state_layout],
            immediate_size: 0,
        });
        let arg_pass_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("builder_arg_pass_layout"),
            bind_group_layouts: &[&state_layout, &args_layout],
            immediate_size: 0,
        });

        let create = |entry_point: &str, layout: &wgpu::PipelineLayout| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            construct_field: create("construct_field", &pass_layout),
            create_voxels: create("create_voxels", &pass_layout),
            chunk_modify_arg: create("chunk_modify_arg", &arg_pass_layout),
            init_node: create("init_node", &pass_layout),
            tag_node: create("tag_node", &pass_layout),
            alloc_node: create("alloc_node", &pass_layout),
            modify_arg: create("modify_arg", &arg_pass_layout),
            finalize_chunk: create("finalize_chunk", &pass_layout),
            state_layout,
            args_layout,
        }
    }

    /// Bind groups for `buffers`: (state, args)
    pub fn bind_groups(
        &self,
        device: &wgpu::Device,
        buffers: &BuildBuffers,
    ) -> (wgpu::BindGroup, wgpu::BindGroup) {
        let state_buffers = [
            &buffers.field,
            &buffers.terrain,
            &buffers.fragment_list,
            &buffers.fragment_list_info,
            &buffers.chunk_octree,
            &buffers.counter,
            &buffers.build_info,
            &buffers.octree_length,
            &buffers.chunks_info,
            &buffers.chunks,
            &buffers.write_offset,
        ];
        let state_entries: Vec<wgpu::BindGroupEntry> = state_buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let state = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("builder_state_bind_group"),
            layout: &self.state_layout,
            entries: &state_entries,
        });

        let args = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("builder_args_bind_group"),
            layout: &self.args_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.tag_args.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.node_args.as_entire_binding(),
                },
            ],
        });

        (state, args)
    }
}
