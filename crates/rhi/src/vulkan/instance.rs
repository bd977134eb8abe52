//! Vulkan instance creation, validation layers and the debug messenger.

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
///
/// Destroys the debug messenger and the instance on drop. Every object
/// created from the instance must be gone by then.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance.
    ///
    /// `surface_extensions` are the instance extensions the presentation
    /// window needs; pass an empty slice for an instance that never presents.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, a required
    /// extension is missing, or instance creation fails.
    pub fn new(
        application_name: &str,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        // SAFETY: the loaded library stays alive as long as `entry`.
        let entry = unsafe { Entry::load()? };

        let validation_available = enable_validation && is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let application_name = CString::new(application_name)
            .map_err(|_| RhiError::InvalidArgument("application name contains NUL".to_string()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"gpuframe")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // SAFETY: every pointer in create_info outlives the call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.3, {} extension(s))",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match setup_debug_messenger(&debug_utils) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    (Some(debug_utils), Some(messenger))
                }
                Err(e) => {
                    // SAFETY: nothing has been created from the instance yet.
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether the debug messenger is forwarding validation messages.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: the messenger belongs to this instance, and callers drop every
        // child object before the instance.
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
    // SAFETY: plain query on a loaded entry.
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

    Ok(available_layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)))
}

fn setup_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> RhiResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    // SAFETY: the callback is a plain function with 'static lifetime.
    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
    Ok(messenger)
}

/// Forwards validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer or null.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: non-null and valid for the duration of the callback.
    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        // SAFETY: the loader passes a NUL-terminated string.
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", kind, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", kind, message),
        _ => debug!("[Vulkan {}] {}", kind, message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Machines without a Vulkan driver skip instead of failing.
    fn no_driver(error: &RhiError) -> bool {
        matches!(
            error,
            RhiError::LoadingError(_)
                | RhiError::VulkanError(
                    vk::Result::ERROR_INCOMPATIBLE_DRIVER | vk::Result::ERROR_INITIALIZATION_FAILED
                )
        )
    }

    #[test]
    fn test_instance_without_surface_extensions() {
        match Instance::new("gpuframe-test", false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) if no_driver(&e) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_instance_with_validation_requested() {
        match Instance::new("gpuframe-test", true, &[]) {
            Ok(instance) => {
                if instance.has_validation() {
                    assert!(instance.debug_utils.is_some());
                }
            }
            Err(e) if no_driver(&e) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_application_name_with_nul_is_rejected() {
        match Instance::new("bad\0name", false, &[]) {
            Err(RhiError::InvalidArgument(_)) => {}
            Err(e) if no_driver(&e) => eprintln!("Skipping test: Vulkan not available"),
            other => panic!("Unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
