// Synchronization primitives
//
// One frame in flight: a single semaphore pair orders acquire -> render ->
// present on the GPU, and a single fence keeps the CPU from re-recording the
// command buffer while the GPU still reads it.

use super::VulkanDevice;
use crate::error::{VkError, VkResultExt};
use anyhow::Result;
use ash::vk;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = fence_create_info();

        // Null handles are ignored by the destroy calls, so a partial set can be torn down
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        let created = unsafe { sync.create_handles(&device.device, &semaphore_info, &fence_info) };
        if let Err(e) = created {
            sync.destroy(&device.device);
            return Err(e.into());
        }

        Ok(sync)
    }

    unsafe fn create_handles(
        &mut self,
        device: &ash::Device,
        semaphore_info: &vk::SemaphoreCreateInfo,
        fence_info: &vk::FenceCreateInfo,
    ) -> Result<(), VkError> {
        self.image_available = device
            .create_semaphore(semaphore_info, None)
            .vk("vkCreateSemaphore")?;
        self.render_finished = device
            .create_semaphore(semaphore_info, None)
            .vk("vkCreateSemaphore")?;
        self.in_flight_fence = device.create_fence(fence_info, None).vk("vkCreateFence")?;
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.in_flight_fence, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
        }
    }
}

/// The fence starts signaled so the very first frame does not wait forever.
pub fn fence_create_info() -> vk::FenceCreateInfo {
    vk::FenceCreateInfo::builder()
        .flags(vk::FenceCreateFlags::SIGNALED)
        .build()
}
