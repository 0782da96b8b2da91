//! Headless wgpu device context

use std::sync::mpsc;
use std::time::Duration;

use crate::core::error::Error;
use crate::core::logging::mib;
use crate::core::types::Result;

/// Storage buffers bound by the widest builder pipeline layout
pub const REQUIRED_STORAGE_BUFFERS: u32 = 10;

/// Device and queue used by the builder
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    wait_timeout: Duration,
}

impl GpuContext {
    /// Create a device without a surface
    pub async fn new_headless(wait_timeout: Duration) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();
        if adapter_limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
            return Err(Error::Gpu(format!(
                "adapter supports {} storage buffers per stage, the builder needs {}",
                adapter_limits.max_storage_buffers_per_shader_stage, REQUIRED_STORAGE_BUFFERS
            )));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("svo_builder_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_storage_buffers_per_shader_stage: REQUIRED_STORAGE_BUFFERS,
                    max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                    max_buffer_size: adapter_limits.max_buffer_size,
                    ..Default::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);
        log::info!(
            "GPU buffer limits: max_buffer_size={:.0}MB, max_storage_binding={:.0}MB",
            mib(adapter_limits.max_buffer_size),
            mib(adapter_limits.max_storage_buffer_binding_size as u64)
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            wait_timeout,
        })
    }

    /// Blocking variant of [`GpuContext::new_headless`]
    pub fn headless(wait_timeout: Duration) -> Result<Self> {
        pollster::block_on(Self::new_headless(wait_timeout))
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Submit `encoder` and block until the device has finished it
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        let index = self.queue.submit(Some(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: Some(self.wait_timeout),
            })
            .map_err(|e| Error::DeviceWait(e.to_string()))?;
        Ok(())
    }

    /// Map the first `size` bytes of a MAP_READ buffer and copy them out.
    /// All work writing the buffer must already be submitted.
    pub fn map_read(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        let slice = buffer.slice(0..size);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(self.wait_timeout),
            })
            .map_err(|e| Error::DeviceWait(e.to_string()))?;

        rx.recv_timeout(self.wait_timeout)
            .map_err(|e| Error::DeviceWait(format!("buffer map did not complete: {}", e)))?
            .map_err(|e| Error::Gpu(format!("buffer map failed: {}", e)))?;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(bytes)
    }

    /// Copy `size` bytes of `buffer` at `offset` to the host
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, offset: u64, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        self.submit_and_wait(encoder)?;

        self.map_read(&staging, size)
    }

    /// Copy `count` u32 words of `buffer` starting at word `first` to the host
    pub fn read_words(&self, buffer: &wgpu::Buffer, first: u64, count: u64) -> Result<Vec<u32>> {
        let bytes = self.read_buffer(buffer, first * 4, count * 4)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_read_words_window() {
        let ctx = GpuContext::headless(Duration::from_secs(10)).unwrap();
        let words: Vec<u32> = (0..64).map(|i| i * 3 + 1).collect();
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_words_test"),
            size: 256,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&words));

        let read = ctx.read_words(&buffer, 5, 10).unwrap();
        assert_eq!(read, &words[5..15]);
        assert!(ctx.read_words(&buffer, 0, 0).unwrap().is_empty());
    }
}
