// Bring-up errors
//
// Every failure carries the call or condition that failed plus the
// source location that raised it.

use ash::prelude::VkResult;
use ash::vk;
use std::panic::Location;

pub type BringUpResult<T> = Result<T, BringUpError>;

#[derive(Debug, thiserror::Error)]
pub enum BringUpError {
    /// A Vulkan call returned something other than success
    #[error("Vulkan call `{call}` failed with {result:?} ({}) at {location}", .result.as_raw())]
    Vulkan {
        call: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },

    /// An explicit invariant check did not hold
    #[error("Precondition `{condition}` failed at {location}")]
    Precondition {
        condition: &'static str,
        location: &'static Location<'static>,
    },

    #[error("Failed to load Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("Name contains an interior NUL byte: {0}")]
    InvalidName(#[from] std::ffi::NulError),
}

/// Attach the failed call name and caller location to a `VkResult`
pub trait VkResultExt<T> {
    fn check(self, call: &'static str) -> BringUpResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    #[track_caller]
    fn check(self, call: &'static str) -> BringUpResult<T> {
        let location = Location::caller();
        self.map_err(|result| BringUpError::Vulkan {
            call,
            result,
            location,
        })
    }
}

/// Fail with `Precondition` unless `holds`
#[track_caller]
pub fn require(holds: bool, condition: &'static str) -> BringUpResult<()> {
    if holds {
        Ok(())
    } else {
        Err(BringUpError::Precondition {
            condition,
            location: Location::caller(),
        })
    }
}

/// Unwrap `value` or fail with `Precondition`
#[track_caller]
pub fn required<T>(value: Option<T>, condition: &'static str) -> BringUpResult<T> {
    match value {
        Some(value) => Ok(value),
        None => Err(BringUpError::Precondition {
            condition,
            location: Location::caller(),
        }),
    }
}
