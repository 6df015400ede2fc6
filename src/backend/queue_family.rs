// Queue family discovery
//
// Graphics and present are required roles; compute and transfer are
// optional and preferably live in families other than the graphics one.

use ash::vk;
use std::collections::BTreeSet;

/// A family index for one role, readable only when it was found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyChoice {
    found: bool,
    index: u32,
}

impl QueueFamilyChoice {
    pub const NONE: Self = Self { found: false, index: 0 };

    pub fn at(index: u32) -> Self {
        Self { found: true, index }
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn get(&self) -> Option<u32> {
        self.found.then_some(self.index)
    }

    fn is(&self, index: u32) -> bool {
        self.get() == Some(index)
    }
}

/// What discovery needs to know about one family
#[derive(Debug, Clone, Copy)]
pub struct FamilyCaps {
    pub flags: vk::QueueFlags,
    pub supports_present: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: QueueFamilyChoice,
    pub present: QueueFamilyChoice,
    pub compute: QueueFamilyChoice,
    pub transfer: QueueFamilyChoice,
}

impl QueueFamilies {
    /// Pick a family per role from the per-family capabilities, in family order.
    ///
    /// The first family that does both graphics and present takes both roles
    /// and nothing after it overrides them. Until then each role keeps the
    /// first family that satisfies it.
    pub fn discover(families: &[FamilyCaps]) -> Self {
        let mut chosen = Self::default();
        let mut combined = false;

        for (index, caps) in (0u32..).zip(families) {
            if combined {
                break;
            }

            let graphics = caps.flags.contains(vk::QueueFlags::GRAPHICS);
            if graphics && caps.supports_present {
                chosen.graphics = QueueFamilyChoice::at(index);
                chosen.present = QueueFamilyChoice::at(index);
                combined = true;
                continue;
            }

            if graphics && !chosen.graphics.found() {
                chosen.graphics = QueueFamilyChoice::at(index);
            }
            if caps.supports_present && !chosen.present.found() {
                chosen.present = QueueFamilyChoice::at(index);
            }
        }

        chosen.compute = Self::prefer_dedicated(families, vk::QueueFlags::COMPUTE, &[chosen.graphics]);
        chosen.transfer = Self::prefer_dedicated(
            families,
            vk::QueueFlags::TRANSFER,
            &[chosen.graphics, chosen.compute],
        );

        chosen
    }

    /// First family with `flag` that avoids every role in `avoid`, relaxing
    /// the avoid list from the back until something matches.
    ///
    /// The first match in this preference order wins. A later family with
    /// the same flag never replaces it, so transfer is not simply the last
    /// transfer-capable family.
    fn prefer_dedicated(
        families: &[FamilyCaps],
        flag: vk::QueueFlags,
        avoid: &[QueueFamilyChoice],
    ) -> QueueFamilyChoice {
        (0..=avoid.len())
            .rev()
            .find_map(|keep| {
                let avoid = &avoid[..keep];
                (0u32..)
                    .zip(families)
                    .find(|(index, caps)| {
                        caps.flags.contains(flag) && !avoid.iter().any(|role| role.is(*index))
                    })
                    .map(|(index, _)| QueueFamilyChoice::at(index))
            })
            .unwrap_or(QueueFamilyChoice::NONE)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.found() && self.present.found()
    }

    /// Every distinct family that needs a queue, ascending
    pub fn unique_indices(&self) -> BTreeSet<u32> {
        [self.graphics, self.present, self.compute, self.transfer]
            .iter()
            .filter_map(QueueFamilyChoice::get)
            .collect()
    }

    /// Queue priority for a family: graphics gets 1.0, everything else 0.5
    pub fn priority_for(&self, index: u32) -> f32 {
        if self.graphics.is(index) {
            1.0
        } else {
            0.5
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    fn family(flags: vk::QueueFlags, supports_present: bool) -> FamilyCaps {
        FamilyCaps { flags, supports_present }
    }

    #[test]
    fn typical_desktop_layout() {
        let families = [
            family(G | C | T, true),
            family(C | T, false),
            family(T, false),
        ];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.graphics.get(), Some(0));
        assert_eq!(chosen.present.get(), Some(0));
        assert_eq!(chosen.compute.get(), Some(1));
        assert_eq!(chosen.transfer.get(), Some(2));
        assert!(chosen.is_complete());
        assert_eq!(chosen.unique_indices().into_iter().collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn combined_family_overrides_earlier_split_choices() {
        let families = [
            family(G, false),
            family(T, true),
            family(G | C, true),
            family(G, true),
        ];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.graphics.get(), Some(2));
        assert_eq!(chosen.present.get(), Some(2));
    }

    #[test]
    fn split_graphics_and_present_keep_first_matches() {
        let families = [
            family(G, false),
            family(T, true),
            family(G, false),
            family(T, true),
        ];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.graphics.get(), Some(0));
        assert_eq!(chosen.present.get(), Some(1));
        assert!(chosen.is_complete());
    }

    #[test]
    fn missing_present_is_incomplete() {
        let chosen = QueueFamilies::discover(&[family(G | C | T, false)]);

        assert_eq!(chosen.graphics.get(), Some(0));
        assert!(!chosen.present.found());
        assert_eq!(chosen.present.get(), None);
        assert!(!chosen.is_complete());
    }

    #[test]
    fn missing_graphics_is_incomplete() {
        let chosen = QueueFamilies::discover(&[family(C | T, true)]);
        assert!(!chosen.graphics.found());
        assert!(!chosen.is_complete());
    }

    #[test]
    fn compute_and_transfer_fall_back_to_shared_families() {
        let chosen = QueueFamilies::discover(&[family(G | C | T, true)]);

        assert_eq!(chosen.compute.get(), Some(0));
        assert_eq!(chosen.transfer.get(), Some(0));
        assert_eq!(chosen.unique_indices().len(), 1);
    }

    #[test]
    fn transfer_prefers_family_distinct_from_graphics_over_shared_compute() {
        let families = [family(G | T, true), family(C | T, false)];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.compute.get(), Some(1));
        // Nothing avoids both graphics and compute, so only graphics is avoided
        assert_eq!(chosen.transfer.get(), Some(1));
    }

    #[test]
    fn later_transfer_families_do_not_replace_the_first_match() {
        let families = [
            family(G | C | T, true),
            family(T, false),
            family(T, false),
            family(C | T, false),
        ];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.compute.get(), Some(3));
        assert_eq!(chosen.transfer.get(), Some(1));
    }

    #[test]
    fn absent_optional_roles_are_not_required() {
        let chosen = QueueFamilies::discover(&[family(G, true)]);

        assert!(chosen.is_complete());
        assert!(!chosen.compute.found());
        assert!(!chosen.transfer.found());
        assert_eq!(chosen.unique_indices().into_iter().collect::<Vec<_>>(), [0]);
    }

    #[test]
    fn priorities_favor_graphics_family() {
        let families = [family(G, false), family(T, true), family(C, false)];
        let chosen = QueueFamilies::discover(&families);

        assert_eq!(chosen.priority_for(0), 1.0);
        assert_eq!(chosen.priority_for(1), 0.5);
        assert_eq!(chosen.priority_for(2), 0.5);
    }
}
