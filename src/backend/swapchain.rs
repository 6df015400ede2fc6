// Swapchain - Window presentation
//
// Manages the chain of images presented to the screen:
// - format / present mode / image count / extent selection
// - swapchain creation and image acquisition
// - one 2-D colour view per swapchain image

use ash::vk;

use super::error::{require, BringUpResult, VkResultExt};
use super::teardown::TeardownStack;

/// The one format we go looking for; anything else falls back to the first entry.
///
/// A surface entry matches only when both its format and its colour space
/// are equal to these; the same format in another colour space does not count.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// FIFO support is mandatory for every surface
pub const FALLBACK_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Choose surface format (prefer B8G8R8A8 sRGB)
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> BringUpResult<vk::SurfaceFormatKHR> {
    require(!formats.is_empty(), "surface reports at least one format")?;

    Ok(formats
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .unwrap_or(formats[0]))
}

/// Choose present mode
///
/// `preferred` is normally MAILBOX (no vsync wait, no tearing). FIFO is
/// always available and is used whenever the preference is not offered.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(FALLBACK_PRESENT_MODE)
}

/// One more than the minimum, clamped to the maximum (0 = unbounded)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

/// The surface's current extent.
///
/// Surfaces that leave the extent to the application (width `u32::MAX`)
/// are not supported.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR) -> BringUpResult<vk::Extent2D> {
    require(
        caps.current_extent.width != u32::MAX,
        "surface reports a defined current extent",
    )?;
    Ok(caps.current_extent)
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    /// The count we asked for; `images.len()` may be larger
    pub requested_image_count: u32,
    pub images: Vec<vk::Image>,
}

impl Swapchain {
    /// Query the surface, create the swapchain and fetch its images.
    ///
    /// Registers the swapchain release on `teardown`.
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        preferred_present_mode: vk::PresentModeKHR,
        teardown: &mut TeardownStack,
    ) -> BringUpResult<Self> {
        // Step 1: Query what the surface supports on the chosen GPU
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        // Step 2: Pick parameters
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        let image_count = choose_image_count(&surface_caps);
        let extent = choose_extent(&surface_caps)?;
        let surface_format = choose_surface_format(&formats)?;

        log::info!(
            "Swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        // Step 3: Create swapchain
        let loader = ash::extensions::khr::Swapchain::new(instance, device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .check("vkCreateSwapchainKHR")?;

        // Step 4: Get swapchain images
        let images = unsafe { loader.get_swapchain_images(handle) };
        teardown.push("swapchain", move || unsafe {
            loader.destroy_swapchain(handle, None);
        });
        let images = images.check("vkGetSwapchainImagesKHR")?;

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            handle,
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
            requested_image_count: image_count,
            images,
        })
    }

    /// One colour view per swapchain image, released as a single entry
    pub fn create_image_views(
        &self,
        device: &ash::Device,
        teardown: &mut TeardownStack,
    ) -> BringUpResult<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(self.images.len());

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { device.create_image_view(&create_info, None) }.check("vkCreateImageView") {
                Ok(view) => views.push(view),
                Err(e) => {
                    // Views made so far are not on the stack yet
                    for &view in &views {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    return Err(e);
                }
            }
        }

        let release_device = device.clone();
        let release_views = views.clone();
        teardown.push("image views", move || unsafe {
            for view in release_views {
                release_device.destroy_image_view(view, None);
            }
        });

        Ok(views)
    }
}
