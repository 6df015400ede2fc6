// Capability scoring - Physical device suitability
//
// Discrete GPUs start at 1000, integrated at 500, everything else is
// disqualified. The 2-D image dimension limit is added on top.

use ash::vk;
use std::ffi::CStr;

/// The properties of a physical device that scoring looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
}

impl DeviceProfile {
    pub fn from_properties(properties: &vk::PhysicalDeviceProperties) -> Self {
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            name,
            device_type: properties.device_type,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        }
    }
}

/// Signature of a device evaluator; `score` is the default
pub type EvaluateFn = fn(&DeviceProfile) -> u32;

/// Suitability score. Zero means the device must never be selected.
pub fn score(profile: &DeviceProfile) -> u32 {
    let base: u32 = match profile.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 500,
        _ => return 0,
    };

    base.saturating_add(profile.max_image_dimension_2d)
}

/// Index of the first strictly-highest non-zero score
pub fn select_best(scores: impl IntoIterator<Item = u32>) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, score) in scores.into_iter().enumerate() {
        let best_score = best.map_or(0, |(_, s)| s);
        if score > best_score {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
}

/// Run `evaluate` over every profile and pick the best one
pub fn select_with(profiles: &[DeviceProfile], evaluate: EvaluateFn) -> Option<usize> {
    select_best(profiles.iter().map(|profile| {
        let score = evaluate(profile);
        log::info!("GPU candidate {} ({:?}): score {}", profile.name, profile.device_type, score);
        score
    }))
}
