use super::device::DeviceContext;
use super::error::RenderError;
use super::upload;

use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;

use vulkanalia::vk::KhrSurfaceExtension;
use vulkanalia::vk::KhrSwapchainExtension;

/// Exact-match preference for the swapchain pixel format; the first reported
/// format is used when it is absent.
const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Soft presentation-layer signals, distinct from hard errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    /// Still usable this frame; recreation should be scheduled.
    Suboptimal,
    /// The chain no longer matches the window; the frame must be abandoned
    /// and the chain rebuilt.
    OutOfDate,
}

/// Result of trying to acquire a presentable image.
#[derive(Copy, Clone, Debug)]
pub enum Acquisition {
    Ready(u32, SurfaceStatus),
    OutOfDate,
}

#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: instance
                .get_physical_device_surface_capabilities_khr(physical_device, surface)?,
            formats: instance.get_physical_device_surface_formats_khr(physical_device, surface)?,
            present_modes: instance
                .get_physical_device_surface_present_modes_khr(physical_device, surface)?,
        })
    }
}

pub fn get_swapchain_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .unwrap_or_else(|| formats[0])
}

pub fn get_swapchain_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Honors a fixed `current_extent` when the surface reports one; otherwise
/// clamps the window's framebuffer size to the reported bounds.
pub fn get_swapchain_extent(
    width: u32,
    height: u32,
    capabilities: vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D::builder()
            .width(width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

pub fn get_swapchain_image_count(capabilities: vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// The presentation surface: the swapchain, its images and views, and the
/// matching depth resources. Fully rebuilt whenever the window extent changes
/// or acquisition/presentation reports staleness.
#[derive(Clone, Debug)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,
}

impl Swapchain {
    /// Builds the chain for the given framebuffer size. Pass the retired
    /// chain as `old_swapchain` during recreation so the new chain exists
    /// before the old one is destroyed.
    pub unsafe fn create(
        instance: &Instance,
        context: &DeviceContext,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        command_pool: vk::CommandPool,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let support = SwapchainSupport::get(instance, surface, context.physical_device)?;

        let surface_format = get_swapchain_surface_format(&support.formats);
        let present_mode = get_swapchain_present_mode(&support.present_modes);
        let extent = get_swapchain_extent(width, height, support.capabilities);
        let image_count = get_swapchain_image_count(support.capabilities);

        debug!(
            "Creating swapchain: {:?} / {:?}, {}x{}, {} images.",
            surface_format.format, present_mode, extent.width, extent.height, image_count
        );

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let device = &context.device;
        let swapchain = device.create_swapchain_khr(&info, None)?;
        let images = device.get_swapchain_images_khr(swapchain)?;

        let image_views = images
            .iter()
            .map(|i| {
                upload::create_image_view_2d(
                    device,
                    *i,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let (depth_image, depth_image_memory, depth_image_view) =
            create_depth_resources(instance, context, extent, command_pool)?;

        Ok(Self {
            swapchain,
            format: surface_format.format,
            extent,
            images,
            image_views,
            depth_image,
            depth_image_memory,
            depth_image_view,
        })
    }

    /// Asks the presentation engine for the next image, to be signaled on
    /// `semaphore` when it becomes usable. Staleness is reported as a value,
    /// not an error.
    pub unsafe fn acquire(&self, device: &Device, semaphore: vk::Semaphore) -> Result<Acquisition> {
        let result = device.acquire_next_image_khr(
            self.swapchain,
            u64::MAX,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((image_index, code)) => {
                let status = if code == vk::SuccessCode::SUBOPTIMAL_KHR {
                    SurfaceStatus::Suboptimal
                } else {
                    SurfaceStatus::Optimal
                };
                Ok(Acquisition::Ready(image_index, status))
            }
            Err(e) if e == vk::ErrorCode::OUT_OF_DATE_KHR => Ok(Acquisition::OutOfDate),
            Err(e) => Err(RenderError::FatalSubmission(e).into()),
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    pub unsafe fn present(
        &self,
        device: &Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SurfaceStatus> {
        let wait_semaphores = &[wait_semaphore];
        let swapchains = &[self.swapchain];
        let image_indices = &[image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        match device.queue_present_khr(queue, &info) {
            Ok(code) if code == vk::SuccessCode::SUBOPTIMAL_KHR => Ok(SurfaceStatus::Suboptimal),
            Ok(_) => Ok(SurfaceStatus::Optimal),
            Err(e) if e == vk::ErrorCode::OUT_OF_DATE_KHR => Ok(SurfaceStatus::OutOfDate),
            Err(e) => Err(RenderError::FatalSubmission(e).into()),
        }
    }

    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_image_view(self.depth_image_view, None);
        device.destroy_image(self.depth_image, None);
        device.free_memory(self.depth_image_memory, None);
        self.image_views
            .iter()
            .for_each(|v| device.destroy_image_view(*v, None));
        device.destroy_swapchain_khr(self.swapchain, None);
    }
}

unsafe fn create_depth_resources(
    instance: &Instance,
    context: &DeviceContext,
    extent: vk::Extent2D,
    command_pool: vk::CommandPool,
) -> Result<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
    let format = upload::find_depth_format(instance, context.physical_device)?;

    let (depth_image, depth_image_memory) = upload::create_image_2d(
        instance,
        context.physical_device,
        &context.device,
        extent.width,
        extent.height,
        format,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let depth_image_view = upload::create_image_view_2d(
        &context.device,
        depth_image,
        format,
        vk::ImageAspectFlags::DEPTH,
    )?;

    upload::transition_image_layout(
        &context.device,
        command_pool,
        context.queue,
        depth_image,
        vk::ImageAspectFlags::DEPTH,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    )?;

    Ok((depth_image, depth_image_memory, depth_image_view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn preferred_format_selected_when_present() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let selected = get_swapchain_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn first_format_selected_when_preferred_absent() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let selected = get_swapchain_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn mailbox_preferred_when_available() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            get_swapchain_present_mode(&modes),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_fallback_when_only_fifo_available() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(get_swapchain_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn fixed_current_extent_is_honored() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        let extent = get_swapchain_extent(1024, 768, caps);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn window_extent_clamped_when_surface_leaves_it_free() {
        let caps = capabilities((u32::MAX, u32::MAX), (320, 240), (1920, 1080));
        let extent = get_swapchain_extent(1024, 768, caps);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 768);

        let oversized = get_swapchain_extent(2560, 1440, caps);
        assert_eq!(oversized.width, 1920);
        assert_eq!(oversized.height, 1080);

        let undersized = get_swapchain_extent(100, 100, caps);
        assert_eq!(undersized.width, 320);
        assert_eq!(undersized.height, 240);
    }

    #[test]
    fn selection_is_idempotent_for_a_fixed_extent() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let first = get_swapchain_extent(1024, 768, caps);
        let second = get_swapchain_extent(1024, 768, caps);
        assert_eq!(first.width, second.width);
        assert_eq!(first.height, second.height);
        assert_eq!(
            get_swapchain_image_count(caps),
            get_swapchain_image_count(caps)
        );
    }

    #[test]
    fn image_count_is_one_above_minimum_within_limits() {
        let mut caps = capabilities((800, 600), (1, 1), (4096, 4096));
        caps.min_image_count = 2;
        caps.max_image_count = 0; // unbounded
        assert_eq!(get_swapchain_image_count(caps), 3);

        caps.max_image_count = 2;
        assert_eq!(get_swapchain_image_count(caps), 2);
    }
}
