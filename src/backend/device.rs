// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (capability scoring)
// - Queue family discovery
// - Logical device + queue creation
// - Swapchain, image views, command pools/buffers, per-image sync objects
//
// Everything created here is released through the device's own teardown
// stack, newest first.

use ash::vk;

use super::command::{CommandBuffers, CommandPoolPlan, CommandPools};
use super::error::{require, required, BringUpResult, VkResultExt};
use super::instance::InstanceContext;
use super::queue_family::{FamilyCaps, QueueFamilies};
use super::scoring::{self, DeviceProfile, EvaluateFn};
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use super::teardown::TeardownStack;

/// Knobs for device bring-up
#[derive(Clone, Copy)]
pub struct DeviceSettings {
    pub preferred_present_mode: vk::PresentModeKHR,
    pub evaluate: EvaluateFn,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            evaluate: scoring::score,
        }
    }
}

/// Vulkan device and everything hanging off it
pub struct DeviceContext {
    pub physical_device: vk::PhysicalDevice,
    pub profile: DeviceProfile,
    pub device: ash::Device,
    pub queue_families: QueueFamilies,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub swapchain: Swapchain,
    pub image_views: Vec<vk::ImageView>,
    pub command_pools: CommandPools,
    pub command_buffers: CommandBuffers,
    /// One per swapchain image
    pub frame_sync: Vec<FrameSync>,

    teardown: TeardownStack,
}

impl DeviceContext {
    /// Run device bring-up against an existing instance and surface
    pub fn new(
        instance: &InstanceContext,
        surface: vk::SurfaceKHR,
        settings: &DeviceSettings,
    ) -> BringUpResult<Self> {
        let mut teardown = TeardownStack::new();

        // Step 1: Pick physical device (GPU)
        let (physical_device, profile) = Self::choose_physical_device(instance, settings.evaluate)?;
        log::info!("Selected GPU: {}", profile.name);

        // Step 2: Find queue families
        let queue_families = Self::find_queue_families(instance, surface, physical_device)?;

        // Step 3: Create logical device
        let device = Self::create_logical_device(instance, physical_device, &queue_families)?;
        {
            let device = device.clone();
            teardown.push("device", move || unsafe {
                device.destroy_device(None);
            });
        }
        log::info!("Logical device created");

        let graphics_family = required(queue_families.graphics.get(), "a queue family supports graphics")?;
        let present_family = required(queue_families.present.get(), "a queue family supports present")?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        // Step 4: Swapchain and its images
        let swapchain = Swapchain::new(
            &instance.instance,
            &device,
            physical_device,
            &instance.surface_loader,
            surface,
            settings.preferred_present_mode,
            &mut teardown,
        )?;
        let image_views = swapchain.create_image_views(&device, &mut teardown)?;
        log::debug!(
            "Swapchain {:?}: {} images ({} requested), {} views",
            swapchain.handle,
            swapchain.images.len(),
            swapchain.requested_image_count,
            image_views.len()
        );

        // Step 5: Command pools and buffers
        let plan = CommandPoolPlan::new(graphics_family, present_family);
        let command_pools = CommandPools::create(&device, &plan, &mut teardown)?;
        let command_buffers = CommandBuffers::allocate(&device, &command_pools)?;

        // Step 6: Per-image synchronization
        let frame_sync = FrameSync::create_all(&device, swapchain.images.len(), &mut teardown)?;

        log::info!("Device bring-up complete ({} release actions)", teardown.len());

        Ok(Self {
            physical_device,
            profile,
            device,
            queue_families,
            graphics_queue,
            present_queue,
            swapchain,
            image_views,
            command_pools,
            command_buffers,
            frame_sync,
            teardown,
        })
    }

    fn choose_physical_device(
        instance: &InstanceContext,
        evaluate: EvaluateFn,
    ) -> BringUpResult<(vk::PhysicalDevice, DeviceProfile)> {
        let mut profiles: Vec<DeviceProfile> = instance
            .physical_devices
            .iter()
            .map(|&device| {
                let properties = unsafe { instance.instance.get_physical_device_properties(device) };
                DeviceProfile::from_properties(&properties)
            })
            .collect();

        let best = required(
            scoring::select_with(&profiles, evaluate),
            "at least one physical device scores above zero",
        )?;

        Ok((instance.physical_devices[best], profiles.swap_remove(best)))
    }

    fn find_queue_families(
        instance: &InstanceContext,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> BringUpResult<QueueFamilies> {
        let properties = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        // Present support is asked for every family
        let mut families = Vec::with_capacity(properties.len());
        for (index, props) in (0u32..).zip(&properties) {
            let supports_present = unsafe {
                instance.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface,
                )
            }
            .check("vkGetPhysicalDeviceSurfaceSupportKHR")?;

            families.push(FamilyCaps {
                flags: props.queue_flags,
                supports_present,
            });
        }

        let chosen = QueueFamilies::discover(&families);
        log::info!(
            "Selected queue families: graphics {:?}, present {:?}, compute {:?}, transfer {:?}",
            chosen.graphics.get(),
            chosen.present.get(),
            chosen.compute.get(),
            chosen.transfer.get()
        );

        require(chosen.is_complete(), "queue families support graphics and present")?;

        Ok(chosen)
    }

    fn create_logical_device(
        instance: &InstanceContext,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
    ) -> BringUpResult<ash::Device> {
        let families: Vec<u32> = queue_families.unique_indices().into_iter().collect();
        // One priority per family; the create infos point into this
        let priorities: Vec<[f32; 1]> = families
            .iter()
            .map(|&index| [queue_families.priority_for(index)])
            .collect();

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .zip(&priorities)
            .map(|(&index, priority)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(index)
                    .queue_priorities(priority)
                    .build()
            })
            .collect();

        // Required device extensions
        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .check("vkCreateDevice")
    }

    /// One-line description of what was brought up
    pub fn summary(&self) -> String {
        format!(
            "{} [{:?}]: queues g={:?}/p={:?} (compute {:?}, transfer {:?}), \
             swapchain {}x{} {:?}/{:?} {:?}, {} views, pools {:?}/{:?}, buffers {:?}/{:?}, {} frame sync sets",
            self.profile.name,
            self.physical_device,
            self.graphics_queue,
            self.present_queue,
            self.queue_families.compute.get(),
            self.queue_families.transfer.get(),
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            self.swapchain.format,
            self.swapchain.color_space,
            self.swapchain.present_mode,
            self.image_views.len(),
            self.command_pools.graphics,
            self.command_pools.present,
            self.command_buffers.graphics,
            self.command_buffers.present,
            self.frame_sync.len()
        )
    }

    pub fn release_action_count(&self) -> usize {
        self.teardown.len()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> BringUpResult<()> {
        unsafe { self.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }

    /// Release everything this context owns, newest first
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.teardown.is_empty() {
            return;
        }

        log::info!("Destroying Vulkan device...");
        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }
        self.teardown.release_all();
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.release();
    }
}
