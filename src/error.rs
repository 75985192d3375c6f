// Error classification
//
// Two fatal tiers: setup errors (exit code 1) and failed Vulkan calls
// (exit code 2). Both propagate as `anyhow::Error` up to the single handler in
// `lib.rs`, which picks the exit code by looking through the error chain.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a clean shutdown after the window was closed.
pub const EXIT_OK: u8 = 0;
/// Exit code for a fatal setup error.
pub const EXIT_SETUP: u8 = 1;
/// Exit code for a Vulkan call that returned a non-success code.
pub const EXIT_VULKAN: u8 = 2;

/// Fatal conditions detected by the program itself rather than by the driver.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("shader file not found: {0}")]
    ShaderMissing(PathBuf),

    #[error("failed to read shader file {path}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid SPIR-V")]
    InvalidSpirv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("expected exactly one physical device, found {0}")]
    PhysicalDeviceCount(usize),

    #[error("no queue family with graphics support")]
    NoGraphicsQueue,

    #[error("queue family {0} cannot present to the window surface")]
    PresentUnsupported(u32),

    #[error("window system has no Vulkan surface support ({0:?})")]
    UnsupportedWindowSystem(vk::Result),

    #[error("failed to load the Vulkan library")]
    Loader(#[from] ash::LoadingError),
}

/// A Vulkan call that returned something other than `VK_SUCCESS`.
#[derive(Debug, Error)]
#[error("{call} failed: {result:?} ({code})", code = .result.as_raw())]
pub struct VkError {
    pub call: &'static str,
    pub result: vk::Result,
}

impl VkError {
    /// The surface changed underneath the swapchain. Recoverable once swapchain
    /// recreation exists; fatal for now.
    pub fn is_out_of_date(&self) -> bool {
        self.result == vk::Result::ERROR_OUT_OF_DATE_KHR
    }
}

/// Tags a raw `VkResult` with the name of the call that produced it.
pub trait VkResultExt<T> {
    fn vk(self, call: &'static str) -> Result<T, VkError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk(self, call: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError { call, result })
    }
}

/// Pick the process exit code for a fatal error.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if err.chain().any(|cause| cause.is::<VkError>()) {
        EXIT_VULKAN
    } else {
        EXIT_SETUP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn vulkan_failures_exit_with_two() {
        let err: anyhow::Result<()> = Err(vk::Result::ERROR_DEVICE_LOST)
            .vk("vkQueueSubmit")
            .context("Failed to submit frame");
        assert_eq!(exit_code(&err.unwrap_err()), EXIT_VULKAN);
    }

    #[test]
    fn setup_failures_exit_with_one() {
        let err = anyhow::Error::new(SetupError::PhysicalDeviceCount(2));
        assert_eq!(exit_code(&err), EXIT_SETUP);

        let err = anyhow::anyhow!("window creation failed");
        assert_eq!(exit_code(&err), EXIT_SETUP);
    }

    #[test]
    fn unsupported_window_system_is_a_setup_failure() {
        let err: anyhow::Result<()> = Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
            .map_err(SetupError::UnsupportedWindowSystem)
            .context("Failed to initialize Vulkan");
        let err = err.unwrap_err();
        assert_eq!(exit_code(&err), EXIT_SETUP);
        assert!(format!("{:#}", err).contains("ERROR_EXTENSION_NOT_PRESENT"));
    }

    #[test]
    fn message_carries_decoded_name_and_code() {
        let err = VkError {
            call: "vkCreateInstance",
            result: vk::Result::ERROR_LAYER_NOT_PRESENT,
        };
        assert_eq!(
            err.to_string(),
            "vkCreateInstance failed: ERROR_LAYER_NOT_PRESENT (-6)"
        );
    }

    #[test]
    fn out_of_date_is_flagged() {
        let err = VkError {
            call: "vkAcquireNextImageKHR",
            result: vk::Result::ERROR_OUT_OF_DATE_KHR,
        };
        assert!(err.is_out_of_date());
        assert!(!VkError { call: "x", result: vk::Result::ERROR_DEVICE_LOST }.is_out_of_date());
    }
}
