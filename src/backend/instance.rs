// Vulkan Instance - connection to the driver
//
// Responsibilities:
// - Window-system extension discovery
// - Validation layer allow-list filtering (debug builds only)
// - Debug messenger routed into the `log` facade

use crate::error::{SetupError, VkResultExt};
use anyhow::{Context, Result};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Instance layers we enable when they are installed. Anything else is ignored.
pub const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

const APP_NAME: &CStr = c"Hello Triangle";
const ENGINE_NAME: &CStr = c"No Engine";

/// Error-severity validation messages seen since startup.
static VALIDATION_ERRORS: AtomicUsize = AtomicUsize::new(0);

pub fn validation_error_count() -> usize {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

/// Vulkan instance wrapper with automatic cleanup
pub struct VulkanInstance {
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create the instance for windows living on `display`.
    ///
    /// `enable_validation` asks for the validation layer and the debug
    /// messenger. Either is skipped silently when it is not installed.
    pub fn new(display: RawDisplayHandle, enable_validation: bool) -> Result<Arc<Self>> {
        let entry = unsafe { Entry::load() }.map_err(SetupError::from)?;

        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .vk("vkEnumerateInstanceExtensionProperties")?;

        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(SetupError::UnsupportedWindowSystem)?;
        let surface_extensions: Vec<&CStr> = surface_extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();

        // Layers
        let available_layers = if enable_validation {
            entry
                .enumerate_instance_layer_properties()
                .vk("vkEnumerateInstanceLayerProperties")?
        } else {
            Vec::new()
        };
        let available_layer_names: Vec<&CStr> = available_layers
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
            .collect();
        let layers = filter_layers(&available_layer_names, &VALIDATION_LAYERS);
        if enable_validation {
            log::info!(
                "enabled {}/{} validation layers",
                layers.len(),
                available_layers.len()
            );
        }

        // Debug utils is provided either by the loader or by one of the enabled layers
        let debug_utils_available = enable_validation && {
            let mut advertised = debug_utils_advertised(&available_extensions);
            for &layer in &layers {
                let layer_extensions = entry
                    .enumerate_instance_extension_properties(Some(layer))
                    .vk("vkEnumerateInstanceExtensionProperties")?;
                advertised |= debug_utils_advertised(&layer_extensions);
            }
            advertised
        };
        if enable_validation && !debug_utils_available {
            log::warn!("{:?} not available, skipping debug messenger", DebugUtils::name());
        }

        let extensions = instance_extensions(&surface_extensions, debug_utils_available);
        log::info!(
            "enabled {}/{} extensions",
            extensions.len(),
            available_extensions.len()
        );

        let instance = Self::create_instance(&entry, &extensions, &layers, debug_utils_available)?;

        let debug_utils = if debug_utils_available {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug_utils) => Some(debug_utils),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            debug_utils,
            instance,
            entry,
        }))
    }

    fn create_instance(
        entry: &Entry,
        extensions: &[&CStr],
        layers: &[&CStr],
        debug_utils: bool,
    ) -> Result<ash::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(APP_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are reported as well
        let mut messenger_info = messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if debug_utils {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .vk("vkCreateInstance")
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&messenger_create_info(), None)
        }
        .vk("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }

        let errors = validation_error_count();
        if errors > 0 {
            log::warn!("{} validation error(s) reported", errors);
        }
    }
}

/// Keep the available layers that appear on the allow-list, in driver order.
pub fn filter_layers<'a>(available: &[&'a CStr], allow: &[&CStr]) -> Vec<&'a CStr> {
    available
        .iter()
        .copied()
        .filter(|name| allow.iter().any(|allowed| allowed == name))
        .collect()
}

/// Surface extensions first, then debug utils when it was requested and exists.
pub fn instance_extensions<'a>(surface: &[&'a CStr], debug_utils: bool) -> Vec<&'a CStr> {
    let mut extensions = surface.to_vec();
    if debug_utils {
        extensions.push(DebugUtils::name());
    }
    extensions
}

fn extension_name(props: &vk::ExtensionProperties) -> &CStr {
    unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
}

/// Whether `VK_EXT_debug_utils` is in an extension list from the loader or a layer.
pub fn debug_utils_advertised(extensions: &[vk::ExtensionProperties]) -> bool {
    extensions
        .iter()
        .any(|ext| extension_name(ext) == DebugUtils::name())
}

/// Log level for a validation message. Everything the messenger is asked
/// for must pass the default `info` filter.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        _ => log::Level::Info,
    }
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Never aborts the call that triggered the message.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    if message_severity == vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
    }
    log::log!(severity_level(message_severity), "validation layer: {}", message);

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &byte) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = byte as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn debug_utils_from_loader_is_found() {
        let loader = [extension(c"VK_KHR_surface"), extension(c"VK_EXT_debug_utils")];
        assert!(debug_utils_advertised(&loader));
    }

    #[test]
    fn debug_utils_from_validation_layer_is_found() {
        let loader = [extension(c"VK_KHR_surface"), extension(c"VK_KHR_xcb_surface")];
        let layer = [extension(c"VK_EXT_debug_report"), extension(c"VK_EXT_debug_utils")];
        assert!(!debug_utils_advertised(&loader));
        assert!(debug_utils_advertised(&layer));
    }

    #[test]
    fn debug_utils_absent_everywhere() {
        let loader = [extension(c"VK_KHR_surface"), extension(c"VK_EXT_debug_report")];
        assert!(!debug_utils_advertised(&loader));
        assert!(!debug_utils_advertised(&[]));
    }

    #[test]
    fn requested_severities_pass_the_default_filter() {
        let filter = Config::default().log_level();
        for severity in [
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        ] {
            assert!(severity_level(severity) <= filter, "{:?} is filtered out", severity);
        }
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            log::Level::Error
        );
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            log::Level::Warn
        );
    }

    #[test]
    fn only_allow_listed_layers_survive() {
        let available = [
            c"VK_LAYER_MESA_device_select",
            c"VK_LAYER_KHRONOS_validation",
            c"VK_LAYER_LUNARG_api_dump",
        ];
        let layers = filter_layers(&available, &VALIDATION_LAYERS);
        assert_eq!(layers, vec![c"VK_LAYER_KHRONOS_validation"]);
    }

    #[test]
    fn missing_validation_layer_enables_nothing() {
        let available = [c"VK_LAYER_MESA_device_select"];
        assert!(filter_layers(&available, &VALIDATION_LAYERS).is_empty());
        assert!(filter_layers(&[], &VALIDATION_LAYERS).is_empty());
    }

    #[test]
    fn debug_utils_is_appended_only_on_request() {
        let surface = [c"VK_KHR_surface", c"VK_KHR_xcb_surface"];

        let plain = instance_extensions(&surface, false);
        assert_eq!(plain, surface.to_vec());

        let debug = instance_extensions(&surface, true);
        assert_eq!(debug.len(), 3);
        assert_eq!(debug[..2], surface[..]);
        assert_eq!(debug[2], c"VK_EXT_debug_utils");
    }

    #[test]
    fn messenger_reports_verbose_warning_and_error() {
        let info = messenger_create_info();
        let severity = info.message_severity;
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(!severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn callback_counts_errors_and_never_aborts() {
        let before = validation_error_count();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: c"vkDestroyDevice: object not destroyed".as_ptr(),
            ..Default::default()
        };
        let verdict = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(verdict, vk::FALSE);
        assert!(validation_error_count() > before);

        let verdict = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(verdict, vk::FALSE);
    }
}
