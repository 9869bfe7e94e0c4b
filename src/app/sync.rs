use super::app_defines::MAX_FRAMES_IN_FLIGHT;

use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

/// One pre-allocated bundle of per-frame resources, reused cyclically.
///
/// The semaphores order GPU work (acquisition -> rendering -> presentation)
/// and are never waited on by the host; the fence is the host-visible signal
/// that the slot's command buffer and uniform region are free to rewrite.
#[derive(Copy, Clone, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Fixed arena of `MAX_FRAMES_IN_FLIGHT` frame slots plus the rotating
/// index. Slots are created once and never reallocated.
#[derive(Clone, Debug)]
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    current: usize,
}

pub fn next_index(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

impl FrameSync {
    pub unsafe fn create(device: &Device, command_pool: vk::CommandPool) -> Result<Self> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);

        let command_buffers = device.allocate_command_buffers(&info)?;

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Created signaled so the very first fence wait on each slot passes.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            slots.push(FrameSlot {
                image_available: device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.create_semaphore(&semaphore_info, None)?,
                fence: device.create_fence(&fence_info, None)?,
                command_buffer,
            });
        }

        Ok(Self { slots, current: 0 })
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Rotates to the next slot. Called exactly once per submitted frame,
    /// regardless of which presentable image that frame used.
    pub fn advance(&mut self) {
        self.current = next_index(self.current);
    }

    pub unsafe fn destroy(&self, device: &Device, command_pool: vk::CommandPool) {
        let command_buffers = self
            .slots
            .iter()
            .map(|s| s.command_buffer)
            .collect::<Vec<_>>();
        device.free_command_buffers(command_pool, &command_buffers);

        for slot in &self.slots {
            device.destroy_semaphore(slot.render_finished, None);
            device.destroy_semaphore(slot.image_available, None);
            device.destroy_fence(slot.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_rotates_through_every_slot_and_wraps() {
        let mut index = 0;
        let mut seen = vec![false; MAX_FRAMES_IN_FLIGHT];
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            seen[index] = true;
            index = next_index(index);
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(index, 0);
    }

    #[test]
    fn advancing_is_independent_of_acquired_image_order() {
        // The slot rotation never consults the image index; it is a pure
        // function of the previous slot.
        assert_eq!(next_index(0), 1 % MAX_FRAMES_IN_FLIGHT);
        assert_eq!(next_index(MAX_FRAMES_IN_FLIGHT - 1), 0);
    }
}
