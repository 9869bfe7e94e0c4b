use vulkanalia::prelude::v1_0::*;

pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);

/// Core version requested at instance creation and required of the physical
/// device. `VK_KHR_dynamic_rendering` depends on
/// `VK_KHR_depth_stencil_resolve` / `VK_KHR_create_renderpass2` /
/// `VK_KHR_get_physical_device_properties2`, all of which are core at 1.2,
/// so only the extension itself needs enabling.
pub const REQUIRED_API_VERSION: u32 = vk::make_version(1, 2, 0);

pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_SWAPCHAIN_EXTENSION.name,
    vk::KHR_DYNAMIC_RENDERING_EXTENSION.name,
];

/// Number of frame slots cycled round-robin by the frame loop.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
