pub mod app_defines;
pub mod assets;
pub mod command;
pub mod device;
pub mod error;
pub mod instance;
pub mod mesh;
pub mod pipeline;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod uniform;
pub mod upload;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::window as vk_window;
use winit::window::Window;

use vulkanalia::vk::ExtDebugUtilsExtension;
use vulkanalia::vk::KhrSurfaceExtension;

use assets::RgbaImage;
use device::DeviceContext;
use error::RenderError;
use mesh::{Mesh, Vertex};
use pipeline::Pipeline;
use swapchain::{Acquisition, SurfaceStatus, Swapchain};
use sync::FrameSync;
use texture::Texture;
use uniform::UniformBuffers;

/// Everything the renderer consumes from outside: decoded texture pixels,
/// mesh geometry and compiled shader bytecode.
pub struct Scene {
    pub pixels: RgbaImage,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub vert_spv: Vec<u8>,
    pub frag_spv: Vec<u8>,
}

/// The renderer root. Owns every Vulkan object and tears them down in
/// reverse creation order in `destroy`.
#[derive(Debug)]
pub struct App {
    entry: Entry,
    instance: Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    surface: vk::SurfaceKHR,
    context: DeviceContext,
    command_pool: vk::CommandPool,
    swapchain: Swapchain,
    pipeline: Pipeline,
    texture: Texture,
    mesh: Mesh,
    uniforms: UniformBuffers,
    sync: FrameSync,
    // Retained for the pipeline rebuild on a surface format change.
    vert_spv: Vec<u8>,
    frag_spv: Vec<u8>,
    start: Instant,
    resized: AtomicBool,
}

/// What a swapchain recreation has to rebuild. The pipeline is only touched
/// when the new chain's pixel format no longer matches the format it was
/// compiled against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RebuildScope {
    SurfaceOnly,
    SurfaceAndPipeline,
}

fn rebuild_scope(pipeline_format: vk::Format, swapchain_format: vk::Format) -> RebuildScope {
    if pipeline_format == swapchain_format {
        RebuildScope::SurfaceOnly
    } else {
        RebuildScope::SurfaceAndPipeline
    }
}

impl App {
    pub unsafe fn create(window: &Window, scene: &Scene) -> Result<Self> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;
        let (instance, messenger) = instance::create(window, &entry)?;

        let surface = vk_window::create_surface(&instance, &window, &window)?;
        let context = DeviceContext::create(&instance, surface)?;
        let command_pool =
            command::create_command_pool(&context.device, context.queue_family_index)?;

        let size = window.inner_size();
        let swapchain = Swapchain::create(
            &instance,
            &context,
            surface,
            size.width,
            size.height,
            command_pool,
            vk::SwapchainKHR::null(),
        )?;

        let pipeline = Pipeline::create(
            &context.device,
            swapchain.format,
            &scene.vert_spv,
            &scene.frag_spv,
        )?;

        let texture = Texture::create(&instance, &context, command_pool, &scene.pixels)?;
        let mesh = Mesh::create(
            &instance,
            &context,
            command_pool,
            &scene.vertices,
            &scene.indices,
        )?;
        let uniforms = UniformBuffers::create(
            &instance,
            &context,
            pipeline.descriptor_set_layout,
            &texture,
        )?;

        let sync = FrameSync::create(&context.device, command_pool)?;

        info!("Renderer created ({} swapchain images).", swapchain.images.len());

        Ok(Self {
            entry,
            instance,
            messenger,
            surface,
            context,
            command_pool,
            swapchain,
            pipeline,
            texture,
            mesh,
            uniforms,
            sync,
            vert_spv: scene.vert_spv.clone(),
            frag_spv: scene.frag_spv.clone(),
            start: Instant::now(),
            resized: AtomicBool::new(false),
        })
    }

    /// Renders and presents one frame on the current frame slot.
    ///
    /// The slot's fence is only reset once an image is in hand; an
    /// out-of-date acquisition leaves it signaled, rebuilds the chain and
    /// returns without submitting. Staleness discovered at acquire or
    /// present time triggers recreation after presenting, so the already
    /// rendered frame is not dropped.
    pub unsafe fn run_frame(&mut self, window: &Window) -> Result<()> {
        let slot = *self.sync.current();
        let slot_index = self.sync.current_index();
        let device = &self.context.device;

        device.wait_for_fences(&[slot.fence], true, u64::MAX)?;

        let (image_index, acquire_status) =
            match self.swapchain.acquire(device, slot.image_available)? {
                Acquisition::Ready(image_index, status) => (image_index, status),
                Acquisition::OutOfDate => return self.recreate_swapchain(window),
            };

        device.reset_fences(&[slot.fence])?;

        self.uniforms.update(
            slot_index,
            self.swapchain.extent,
            self.start.elapsed().as_secs_f32(),
        );

        device.reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())?;
        command::record(
            device,
            slot.command_buffer,
            self.swapchain.images[image_index as usize],
            self.swapchain.image_views[image_index as usize],
            self.swapchain.extent,
            &self.pipeline,
            &self.mesh,
            self.uniforms.descriptor_sets[slot_index],
        )?;

        let wait_semaphores = &[slot.image_available];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[slot.command_buffer];
        let signal_semaphores = &[slot.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        let device = &self.context.device;
        device
            .queue_submit(self.context.queue, &[submit_info], slot.fence)
            .map_err(RenderError::FatalSubmission)?;

        let present_status =
            self.swapchain
                .present(device, self.context.queue, image_index, slot.render_finished)?;

        if acquire_status == SurfaceStatus::Suboptimal
            || present_status != SurfaceStatus::Optimal
            || self.resized.load(Ordering::Relaxed)
        {
            self.recreate_swapchain(window)?;
        }

        self.sync.advance();

        Ok(())
    }

    /// Flags the presentation surface as stale. Safe to call from event
    /// handling while a frame is mid-flight; the flag is cleared only after
    /// a successful recreation.
    pub fn notify_resize(&self) {
        self.resized.store(true, Ordering::Relaxed);
    }

    /// Rebuilds the swapchain against the window's current framebuffer size.
    /// The new chain is created while the old one still exists so the driver
    /// can recycle its images.
    unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        debug!("Recreating swapchain ({}x{}).", size.width, size.height);

        self.context.device.device_wait_idle()?;

        let swapchain = Swapchain::create(
            &self.instance,
            &self.context,
            self.surface,
            size.width,
            size.height,
            self.command_pool,
            self.swapchain.swapchain,
        )?;

        self.swapchain.destroy(&self.context.device);
        self.swapchain = swapchain;

        if rebuild_scope(self.pipeline.color_format, self.swapchain.format)
            == RebuildScope::SurfaceAndPipeline
        {
            warn!(
                "Surface format changed ({:?} -> {:?}); rebuilding pipeline.",
                self.pipeline.color_format, self.swapchain.format
            );
            let pipeline = Pipeline::create(
                &self.context.device,
                self.swapchain.format,
                &self.vert_spv,
                &self.frag_spv,
            )?;
            self.pipeline.destroy(&self.context.device);
            self.pipeline = pipeline;
        }

        self.resized.store(false, Ordering::Relaxed);

        Ok(())
    }

    pub unsafe fn destroy(&mut self) {
        self.context.device.device_wait_idle().unwrap();

        let device = &self.context.device;
        self.sync.destroy(device, self.command_pool);
        self.uniforms.destroy(device);
        self.mesh.destroy(device);
        self.texture.destroy(device);
        self.pipeline.destroy(device);
        self.swapchain.destroy(device);
        device.destroy_command_pool(self.command_pool, None);

        self.context.destroy();
        self.instance.destroy_surface_khr(self.surface, None);

        if app_defines::VALIDATION_ENABLED {
            self.instance
                .destroy_debug_utils_messenger_ext(self.messenger, None);
        }

        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recreation_leaves_the_pipeline_alone_while_the_format_holds() {
        assert_eq!(
            rebuild_scope(vk::Format::R8G8B8A8_SRGB, vk::Format::R8G8B8A8_SRGB),
            RebuildScope::SurfaceOnly
        );
    }

    #[test]
    fn a_format_change_forces_a_pipeline_rebuild() {
        assert_eq!(
            rebuild_scope(vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB),
            RebuildScope::SurfaceAndPipeline
        );
        assert_eq!(
            rebuild_scope(vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB),
            RebuildScope::SurfaceAndPipeline
        );
    }
}
