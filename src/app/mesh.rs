use super::device::DeviceContext;
use super::upload;

use std::mem::size_of;

use anyhow::Result;
use nalgebra_glm as glm;
use vulkanalia::prelude::v1_0::*;

/// One vertex of the fixed pipeline layout: 2D position, color, texture
/// coordinates. Field order must match `pipeline::VERTEX_ATTRIBUTES`.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Vertex {
    pub pos: glm::Vec2,
    pub color: glm::Vec3,
    pub uv: glm::Vec2,
}

impl Vertex {
    pub fn new(pos: glm::Vec2, color: glm::Vec3, uv: glm::Vec2) -> Self {
        Self { pos, color, uv }
    }
}

/// Device-local vertex and index buffers. Immutable once uploaded.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertex_buffer: vk::Buffer,
    pub vertex_buffer_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_buffer_memory: vk::DeviceMemory,
    pub index_count: u32,
}

impl Mesh {
    pub unsafe fn create(
        instance: &Instance,
        context: &DeviceContext,
        command_pool: vk::CommandPool,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<Self> {
        let vertex_bytes = std::slice::from_raw_parts(
            vertices.as_ptr().cast::<u8>(),
            size_of::<Vertex>() * vertices.len(),
        );
        let (vertex_buffer, vertex_buffer_memory) = create_device_local_buffer(
            instance,
            context,
            command_pool,
            vertex_bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let index_bytes = std::slice::from_raw_parts(
            indices.as_ptr().cast::<u8>(),
            size_of::<u32>() * indices.len(),
        );
        let (index_buffer, index_buffer_memory) = match create_device_local_buffer(
            instance,
            context,
            command_pool,
            index_bytes,
            vk::BufferUsageFlags::INDEX_BUFFER,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                context.device.free_memory(vertex_buffer_memory, None);
                context.device.destroy_buffer(vertex_buffer, None);
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            vertex_buffer_memory,
            index_buffer,
            index_buffer_memory,
            index_count: indices.len() as u32,
        })
    }

    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_buffer(self.index_buffer, None);
        device.free_memory(self.index_buffer_memory, None);
        device.destroy_buffer(self.vertex_buffer, None);
        device.free_memory(self.vertex_buffer_memory, None);
    }
}

/// Stages `data` into a new device-local buffer. The staging buffer is
/// released before returning, on the failure paths as well.
unsafe fn create_device_local_buffer(
    instance: &Instance,
    context: &DeviceContext,
    command_pool: vk::CommandPool,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let device = &context.device;
    let size = data.len() as u64;

    let (staging_buffer, staging_memory) =
        upload::create_staging_buffer(instance, context.physical_device, device, data)?;

    let result: Result<(vk::Buffer, vk::DeviceMemory)> = (|| {
        let (buffer, memory) = upload::create_buffer(
            instance,
            context.physical_device,
            device,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        if let Err(e) = upload::copy_buffer(
            device,
            command_pool,
            context.queue,
            staging_buffer,
            buffer,
            size,
        ) {
            device.free_memory(memory, None);
            device.destroy_buffer(buffer, None);
            return Err(e);
        }

        Ok((buffer, memory))
    })();

    device.destroy_buffer(staging_buffer, None);
    device.free_memory(staging_memory, None);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{binding_description, VERTEX_ATTRIBUTES};

    #[test]
    fn vertex_matches_the_pipeline_stride() {
        assert_eq!(
            size_of::<Vertex>() as u32,
            binding_description(&VERTEX_ATTRIBUTES).stride
        );
    }
}
