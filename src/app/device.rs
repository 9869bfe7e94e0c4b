use super::app_defines;
use super::swapchain::SwapchainSupport;

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::prelude::v1_0::*;

use vulkanalia::vk::KhrSurfaceExtension;

/// Reason a physical device was rejected during selection.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SuitabilityError(pub &'static str);

/// Connection to one accelerator: the selected physical device, the logical
/// device built on it, and its single graphics+present queue.
///
/// Destroyed last among device-level objects; every dependent resource must
/// be released before `destroy` is called.
#[derive(Clone, Debug)]
pub struct DeviceContext {
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
}

impl DeviceContext {
    pub unsafe fn create(instance: &Instance, surface: vk::SurfaceKHR) -> Result<Self> {
        let (physical_device, queue_family_index) = pick_physical_device(instance, surface)?;

        let queue_priorities = &[1.0];
        let queue_infos = &[vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(queue_priorities)];

        let layers = if app_defines::VALIDATION_ENABLED {
            vec![app_defines::VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let extensions = app_defines::DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        let features = vk::PhysicalDeviceFeatures::builder();

        let mut dynamic_rendering =
            vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut dynamic_rendering);

        let device = instance.create_device(physical_device, &info, None)?;
        let queue = device.get_device_queue(queue_family_index, 0);

        Ok(Self {
            physical_device,
            device,
            queue,
            queue_family_index,
        })
    }

    pub unsafe fn destroy(&self) {
        self.device.destroy_device(None);
    }
}

unsafe fn pick_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    for physical_device in instance.enumerate_physical_devices()? {
        let properties = instance.get_physical_device_properties(physical_device);

        match check_physical_device(instance, surface, physical_device) {
            Err(error) => {
                warn!(
                    "Skipping physical device (`{}`): {}",
                    properties.device_name, error
                );
            }
            Ok(queue_family_index) => {
                info!("Selected physical device (`{}`).", properties.device_name);
                return Ok((physical_device, queue_family_index));
            }
        }
    }

    Err(anyhow!("Failed to find suitable physical device."))
}

/// Returns the index of a queue family supporting both graphics and
/// presentation to `surface`, or the reason the device is unusable.
unsafe fn check_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let properties = instance.get_physical_device_properties(physical_device);
    check_api_version(properties.api_version)?;

    let queue_family_index = find_queue_family(instance, surface, physical_device)?;
    check_physical_device_extensions(instance, physical_device)?;

    let support = SwapchainSupport::get(instance, surface, physical_device)?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Err(anyhow!(SuitabilityError("Insufficient swapchain support.")));
    }

    Ok(queue_family_index)
}

/// Rejects devices below `REQUIRED_API_VERSION`; the dynamic-rendering
/// extension's dependencies are only core from that version on.
pub fn check_api_version(api_version: u32) -> Result<(), SuitabilityError> {
    if api_version < app_defines::REQUIRED_API_VERSION {
        return Err(SuitabilityError(
            "Device does not support the required Vulkan version.",
        ));
    }
    Ok(())
}

unsafe fn find_queue_family(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let properties = instance.get_physical_device_queue_family_properties(physical_device);

    for (index, family) in properties.iter().enumerate() {
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }

        if instance.get_physical_device_surface_support_khr(
            physical_device,
            index as u32,
            surface,
        )? {
            return Ok(index as u32);
        }
    }

    Err(anyhow!(SuitabilityError(
        "Missing graphics+present queue family."
    )))
}

unsafe fn check_physical_device_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<()> {
    let extensions = instance
        .enumerate_device_extension_properties(physical_device, None)?
        .iter()
        .map(|e| e.extension_name)
        .collect::<HashSet<_>>();

    if app_defines::DEVICE_EXTENSIONS
        .iter()
        .all(|e| extensions.contains(e))
    {
        Ok(())
    } else {
        Err(anyhow!(SuitabilityError(
            "Missing required device extensions."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devices_below_the_required_version_are_rejected() {
        assert!(check_api_version(vk::make_version(1, 0, 0)).is_err());
        assert!(check_api_version(vk::make_version(1, 1, 0)).is_err());
        assert!(check_api_version(vk::make_version(1, 2, 0)).is_ok());
        assert!(check_api_version(vk::make_version(1, 3, 0)).is_ok());
    }
}
