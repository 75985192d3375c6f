// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (exactly one GPU must be present)
// - Graphics queue family selection
// - Logical device + queue creation

use super::{Surface, VulkanInstance};
use crate::error::{SetupError, VkResultExt};
use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<VulkanInstance>,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
}

impl VulkanDevice {
    /// Open the single physical device and check it can present to `surface`.
    pub fn new(instance: Arc<VulkanInstance>, surface: &Surface) -> Result<Arc<Self>> {
        let (physical_device, graphics_queue_family) = Self::pick_physical_device(&instance)?;

        if !surface.supports_present(physical_device, graphics_queue_family)? {
            return Err(SetupError::PresentUnsupported(graphics_queue_family).into());
        }

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let (device, graphics_queue) =
            Self::create_logical_device(&instance.instance, physical_device, graphics_queue_family)?;

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            graphics_queue,
            graphics_queue_family,
        }))
    }

    fn pick_physical_device(instance: &VulkanInstance) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .vk("vkEnumeratePhysicalDevices")?;

        let physical_device = single_physical_device(&devices)?;

        let queue_families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        let graphics_family =
            last_graphics_family(&queue_families).ok_or(SetupError::NoGraphicsQueue)?;
        log::debug!(
            "Using queue family {} of {}",
            graphics_family,
            queue_families.len()
        );

        Ok((physical_device, graphics_family))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        // Swapchain is the only device extension we need
        let extensions = [khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .vk("vkCreateDevice")
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.vk("vkDeviceWaitIdle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

/// Exactly one GPU is supported; zero or several is a setup error.
pub fn single_physical_device(
    devices: &[vk::PhysicalDevice],
) -> Result<vk::PhysicalDevice, SetupError> {
    match devices {
        [device] => Ok(*device),
        _ => Err(SetupError::PhysicalDeviceCount(devices.len())),
    }
}

/// Index of the last queue family with graphics support.
pub fn last_graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .rposition(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn exactly_one_device_is_accepted() {
        let gpu = vk::PhysicalDevice::from_raw(0x1);
        assert_eq!(single_physical_device(&[gpu]).unwrap(), gpu);
    }

    #[test]
    fn zero_or_many_devices_are_rejected() {
        assert!(matches!(
            single_physical_device(&[]),
            Err(SetupError::PhysicalDeviceCount(0))
        ));

        let gpus = [vk::PhysicalDevice::from_raw(0x1), vk::PhysicalDevice::from_raw(0x2)];
        assert!(matches!(
            single_physical_device(&gpus),
            Err(SetupError::PhysicalDeviceCount(2))
        ));
    }

    #[test]
    fn last_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(last_graphics_family(&families), Some(2));
    }

    #[test]
    fn no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        assert_eq!(last_graphics_family(&families), None);
        assert_eq!(last_graphics_family(&[]), None);
    }

    #[test]
    fn empty_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [family(vk::QueueFlags::GRAPHICS), empty];
        assert_eq!(last_graphics_family(&families), Some(0));
    }
}
