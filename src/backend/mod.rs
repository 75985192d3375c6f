// Backend module - thin owning wrappers around ash
//
// Each wrapper destroys its handles in Drop and keeps an Arc to the object it
// was created from, so a parent can never be destroyed before its children.

pub mod device;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use frame::TriangleRenderer;
pub use instance::VulkanInstance;
pub use surface::Surface;
pub use swapchain::Swapchain;
