// Vulkan instance - Process-wide API connection
//
// Responsibilities:
// - Instance creation (fixed extensions + window-system extensions, validation layer)
// - Debug messenger routing validation output into `log`
// - Physical device enumeration
// - Presentation surface for the window, once it exists

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, CStr, CString};

use super::error::{require, BringUpResult, VkResultExt};
use super::teardown::TeardownStack;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance, surface loader and the GPUs we may pick from
pub struct InstanceContext {
    entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: Surface,
    pub physical_devices: Vec<vk::PhysicalDevice>,
    /// Whether the validation layer actually got enabled
    pub validation: bool,
}

impl InstanceContext {
    /// Create instance and enumerate GPUs.
    ///
    /// `display` only needs to know the window system, so this can run
    /// before any window exists. Release actions go on `teardown`, which
    /// the caller owns for the lifetime of the process.
    pub fn new<D>(
        display: &D,
        app_name: &str,
        enable_validation: bool,
        teardown: &mut TeardownStack,
    ) -> BringUpResult<Self>
    where
        D: HasRawDisplayHandle,
    {
        log::info!("Creating Vulkan instance: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        // Step 2: Create instance
        let validation = enable_validation && Self::validation_layer_available(&entry)?;
        let instance = Self::create_instance(&entry, display, app_name, validation)?;
        {
            let entry = entry.clone();
            let instance = instance.clone();
            teardown.push("instance", move || unsafe {
                instance.destroy_instance(None);
                drop(entry);
            });
        }

        // Step 3: Setup debug messenger if validation enabled
        if validation {
            let (debug_utils, messenger) = Self::setup_debug_messenger(&entry, &instance)?;
            teardown.push("debug messenger", move || unsafe {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            });
        }

        // Step 4: Enumerate physical devices
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .check("vkEnumeratePhysicalDevices")?;
        require(!physical_devices.is_empty(), "at least one Vulkan physical device")?;
        log::info!("Found {} physical device(s)", physical_devices.len());

        let surface_loader = Surface::new(&entry, &instance);

        Ok(Self {
            entry,
            instance,
            surface_loader,
            physical_devices,
            validation,
        })
    }

    /// Create the presentation surface for `window` and register its release
    pub fn create_surface<W>(&self, window: &W, teardown: &mut TeardownStack) -> BringUpResult<vk::SurfaceKHR>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .check("vkCreateSurfaceKHR")?;

        let surface_loader = self.surface_loader.clone();
        teardown.push("surface", move || unsafe {
            surface_loader.destroy_surface(surface, None);
        });

        log::info!("Created window surface");
        Ok(surface)
    }

    fn validation_layer_available(entry: &Entry) -> BringUpResult<bool> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .check("vkEnumerateInstanceLayerProperties")?;

        let available = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if !available {
            log::warn!(
                "{} requested but not installed, continuing without validation",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
        Ok(available)
    }

    fn create_instance<D: HasRawDisplayHandle>(
        entry: &Entry,
        display: &D,
        app_name: &str,
        validation: bool,
    ) -> BringUpResult<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let window_extensions = ash_window::enumerate_required_extensions(display.raw_display_handle())
            .check("ash_window::enumerate_required_extensions")?;
        let window_extensions: Vec<&CStr> = window_extensions
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();

        let extension_names = required_instance_extensions(&window_extensions, validation);
        for name in &extension_names {
            log::debug!("Instance extension: {}", name.to_string_lossy());
        }
        let extensions: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_names = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.check("vkCreateInstance")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> BringUpResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .check("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }
}

/// Fixed instance extensions followed by the window system's, without duplicates
pub fn required_instance_extensions<'a>(window_extensions: &[&'a CStr], validation: bool) -> Vec<&'a CStr> {
    let mut names: Vec<&'a CStr> = Vec::new();
    if validation {
        names.push(DebugUtils::name());
    }
    names.push(Surface::name());

    for &name in window_extensions {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_extensions_follow_fixed_set() {
        let xlib = c"VK_KHR_xlib_surface";
        let names = required_instance_extensions(&[Surface::name(), xlib], true);

        assert_eq!(names, [DebugUtils::name(), Surface::name(), xlib]);
    }

    #[test]
    fn debug_utils_only_with_validation() {
        let wayland = c"VK_KHR_wayland_surface";
        let names = required_instance_extensions(&[wayland], false);

        assert_eq!(names, [Surface::name(), wayland]);
        assert!(!names.contains(&DebugUtils::name()));
    }

    #[test]
    fn duplicate_window_extensions_collapse() {
        let win32 = c"VK_KHR_win32_surface";
        let names = required_instance_extensions(&[win32, win32, Surface::name()], false);

        assert_eq!(names, [Surface::name(), win32]);
    }
}
