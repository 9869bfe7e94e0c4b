use super::app_defines::MAX_FRAMES_IN_FLIGHT;
use super::device::DeviceContext;
use super::texture::Texture;
use super::upload;

use std::mem::size_of;

use anyhow::Result;
use nalgebra_glm as glm;
use vulkanalia::prelude::v1_0::*;

/// Transform matrices consumed by the vertex stage. Layout must match the
/// uniform block in the vertex shader (std140: Mat4 columns are naturally
/// 16-byte aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct UniformBufferObject {
    pub model: glm::Mat4,
    pub view: glm::Mat4,
    pub proj: glm::Mat4,
}

/// One host-mapped uniform buffer per frame slot, plus the descriptor pool
/// and one descriptor set per slot binding that slot's buffer and the
/// texture sampler.
///
/// The buffers stay mapped for the lifetime of this object; the per-frame
/// update is a plain memory write, never a map/unmap.
#[derive(Clone, Debug)]
pub struct UniformBuffers {
    buffers: Vec<vk::Buffer>,
    memories: Vec<vk::DeviceMemory>,
    mapped: Vec<*mut UniformBufferObject>,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

impl UniformBuffers {
    pub unsafe fn create(
        instance: &Instance,
        context: &DeviceContext,
        descriptor_set_layout: vk::DescriptorSetLayout,
        texture: &Texture,
    ) -> Result<Self> {
        let device = &context.device;
        let size = size_of::<UniformBufferObject>() as u64;

        let mut buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut memories = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut mapped = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        let cleanup = |device: &Device, buffers: &[vk::Buffer], memories: &[vk::DeviceMemory]| {
            for (buffer, memory) in buffers.iter().zip(memories) {
                device.destroy_buffer(*buffer, None);
                device.free_memory(*memory, None);
            }
        };

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let (buffer, memory) = match upload::create_buffer(
                instance,
                context.physical_device,
                device,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_VISIBLE,
            ) {
                Ok(pair) => pair,
                Err(e) => {
                    cleanup(device, &buffers, &memories);
                    return Err(e);
                }
            };

            buffers.push(buffer);
            memories.push(memory);

            match device.map_memory(memory, 0, size, vk::MemoryMapFlags::empty()) {
                Ok(pointer) => mapped.push(pointer.cast::<UniformBufferObject>()),
                Err(e) => {
                    cleanup(device, &buffers, &memories);
                    return Err(e.into());
                }
            }
        }

        let (descriptor_pool, descriptor_sets) = match create_descriptor_sets(
            device,
            descriptor_set_layout,
            &buffers,
            texture,
        ) {
            Ok(pair) => pair,
            Err(e) => {
                cleanup(device, &buffers, &memories);
                return Err(e);
            }
        };

        Ok(Self {
            buffers,
            memories,
            mapped,
            descriptor_pool,
            descriptor_sets,
        })
    }

    /// Writes this frame's matrices into the slot's mapped region: the model
    /// spins about +Z at 90 degrees per second, the camera is a fixed
    /// look-at, and the projection flips Y for Vulkan clip space.
    pub unsafe fn update(&self, slot: usize, extent: vk::Extent2D, elapsed_secs: f32) {
        let model = glm::rotate(
            &glm::identity(),
            elapsed_secs * glm::radians(&glm::vec1(90.0))[0],
            &glm::vec3(0.0, 0.0, 1.0),
        );

        let view = glm::look_at(
            &glm::vec3(2.0, 2.0, 2.0),
            &glm::vec3(0.0, 0.0, 0.0),
            &glm::vec3(0.0, 0.0, 1.0),
        );

        let mut proj = glm::perspective(
            extent.width as f32 / extent.height as f32,
            glm::radians(&glm::vec1(45.0))[0],
            0.1,
            10.0,
        );
        proj[(1, 1)] *= -1.0;

        let ubo = UniformBufferObject { model, view, proj };
        std::ptr::write(self.mapped[slot], ubo);
    }

    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_descriptor_pool(self.descriptor_pool, None);
        for (buffer, memory) in self.buffers.iter().zip(&self.memories) {
            device.unmap_memory(*memory);
            device.destroy_buffer(*buffer, None);
            device.free_memory(*memory, None);
        }
    }
}

unsafe fn create_descriptor_sets(
    device: &Device,
    descriptor_set_layout: vk::DescriptorSetLayout,
    buffers: &[vk::Buffer],
    texture: &Texture,
) -> Result<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
    let count = MAX_FRAMES_IN_FLIGHT as u32;

    let ubo_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(count);

    let sampler_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(count);

    let pool_sizes = &[ubo_size, sampler_size];
    let info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(pool_sizes)
        .max_sets(count);

    let descriptor_pool = device.create_descriptor_pool(&info, None)?;

    let layouts = vec![descriptor_set_layout; MAX_FRAMES_IN_FLIGHT];
    let info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(descriptor_pool)
        .set_layouts(&layouts);

    let descriptor_sets = match device.allocate_descriptor_sets(&info) {
        Ok(sets) => sets,
        Err(e) => {
            device.destroy_descriptor_pool(descriptor_pool, None);
            return Err(e.into());
        }
    };

    for (set, buffer) in descriptor_sets.iter().zip(buffers) {
        let info = vk::DescriptorBufferInfo::builder()
            .buffer(*buffer)
            .offset(0)
            .range(size_of::<UniformBufferObject>() as u64);

        let buffer_info = &[info];
        let ubo_write = vk::WriteDescriptorSet::builder()
            .dst_set(*set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(buffer_info);

        let info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(texture.image_view)
            .sampler(texture.sampler);

        let image_info = &[info];
        let sampler_write = vk::WriteDescriptorSet::builder()
            .dst_set(*set)
            .dst_binding(1)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(image_info);

        device.update_descriptor_sets(
            &[ubo_write, sampler_write],
            &[] as &[vk::CopyDescriptorSet],
        );
    }

    Ok((descriptor_pool, descriptor_sets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubo_is_three_tightly_packed_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 3 * 64);
    }
}
