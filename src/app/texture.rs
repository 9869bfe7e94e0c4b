use super::assets::RgbaImage;
use super::device::DeviceContext;
use super::upload;

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

/// A sampled 2D texture in shader-read-only layout, populated once through
/// the staged upload path and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Texture {
    pub image: vk::Image,
    pub image_memory: vk::DeviceMemory,
    pub image_view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    /// Uploads decoded RGBA8 pixels. The staging buffer is destroyed before
    /// this returns, whether the upload succeeded or not.
    pub unsafe fn create(
        instance: &Instance,
        context: &DeviceContext,
        command_pool: vk::CommandPool,
        pixels: &RgbaImage,
    ) -> Result<Self> {
        let device = &context.device;

        let (staging_buffer, staging_memory) =
            upload::create_staging_buffer(instance, context.physical_device, device, &pixels.data)?;

        let result: Result<(vk::Image, vk::DeviceMemory)> = (|| {
            let (image, image_memory) = upload::create_image_2d(
                instance,
                context.physical_device,
                device,
                pixels.width,
                pixels.height,
                vk::Format::R8G8B8A8_SRGB,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;

            let filled: Result<()> = (|| {
                upload::transition_image_layout(
                    device,
                    command_pool,
                    context.queue,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;

                upload::copy_buffer_to_image(
                    device,
                    command_pool,
                    context.queue,
                    staging_buffer,
                    image,
                    pixels.width,
                    pixels.height,
                )?;

                upload::transition_image_layout(
                    device,
                    command_pool,
                    context.queue,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            })();

            if let Err(e) = filled {
                device.destroy_image(image, None);
                device.free_memory(image_memory, None);
                return Err(e);
            }

            Ok((image, image_memory))
        })();

        device.destroy_buffer(staging_buffer, None);
        device.free_memory(staging_memory, None);

        let (image, image_memory) = result?;

        let image_view = match upload::create_image_view_2d(
            device,
            image,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageAspectFlags::COLOR,
        ) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image, None);
                device.free_memory(image_memory, None);
                return Err(e);
            }
        };

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        let sampler = match device.create_sampler(&info, None) {
            Ok(sampler) => sampler,
            Err(e) => {
                device.destroy_image_view(image_view, None);
                device.destroy_image(image, None);
                device.free_memory(image_memory, None);
                return Err(e.into());
            }
        };

        Ok(Self {
            image,
            image_memory,
            image_view,
            sampler,
        })
    }

    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_sampler(self.sampler, None);
        device.destroy_image_view(self.image_view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.image_memory, None);
    }
}
