// Backend module - Vulkan bring-up layer
//
// Design: Thin wrapper around ash; every acquired object registers its
// release on a teardown stack owned by the context that created it.

pub mod command;
pub mod device;
pub mod error;
pub mod instance;
pub mod queue_family;
pub mod scoring;
pub mod swapchain;
pub mod sync;
pub mod teardown;

pub use device::{DeviceContext, DeviceSettings};
pub use instance::InstanceContext;
pub use teardown::TeardownStack;
