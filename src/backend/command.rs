// Command pools and buffers
//
// One pool per distinct family among graphics and present. When both
// roles share a family the present role aliases the graphics pool, so
// there is exactly one pool and one destroy entry.

use ash::vk;

use super::error::{BringUpResult, VkResultExt};
use super::teardown::TeardownStack;

/// Which pools to create and which one each role uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPoolPlan {
    families: Vec<u32>,
    present_slot: usize,
}

impl CommandPoolPlan {
    pub fn new(graphics_family: u32, present_family: u32) -> Self {
        if graphics_family == present_family {
            Self { families: vec![graphics_family], present_slot: 0 }
        } else {
            Self { families: vec![graphics_family, present_family], present_slot: 1 }
        }
    }

    /// Families that get their own pool; graphics is always first
    pub fn families(&self) -> &[u32] {
        &self.families
    }

    pub fn is_shared(&self) -> bool {
        self.families.len() == 1
    }

    /// Create every planned pool and register one release per created pool.
    ///
    /// `release` builds the destroy closure for a single pool handle.
    pub fn create_with<H, R>(
        &self,
        teardown: &mut TeardownStack,
        mut create: impl FnMut(u32) -> BringUpResult<H>,
        release: impl Fn(H) -> R,
    ) -> BringUpResult<CommandPools<H>>
    where
        H: Copy,
        R: FnOnce() + 'static,
    {
        let mut pools = Vec::with_capacity(self.families.len());
        for &family in &self.families {
            let pool = create(family)?;
            teardown.push("command pool", release(pool));
            pools.push(pool);
        }

        Ok(CommandPools {
            graphics: pools[0],
            present: pools[self.present_slot],
            shared: self.is_shared(),
        })
    }
}

/// Pool handles per role. `present == graphics` when `shared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPools<H = vk::CommandPool> {
    pub graphics: H,
    pub present: H,
    pub shared: bool,
}

impl CommandPools {
    /// Create the pools on `device` with individual buffer reset enabled
    pub fn create(
        device: &ash::Device,
        plan: &CommandPoolPlan,
        teardown: &mut TeardownStack,
    ) -> BringUpResult<Self> {
        let pools = plan.create_with(
            teardown,
            |family| {
                let pool_info = vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(family)
                    // RESET: Allow individual buffer reset
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

                unsafe { device.create_command_pool(&pool_info, None) }.check("vkCreateCommandPool")
            },
            |pool| {
                let device = device.clone();
                move || unsafe { device.destroy_command_pool(pool, None) }
            },
        )?;

        log::info!(
            "Created {} command pool(s) for families {:?} (graphics {:?}, present {:?}{})",
            plan.families().len(),
            plan.families(),
            pools.graphics,
            pools.present,
            if pools.shared { ", shared" } else { "" }
        );

        Ok(pools)
    }
}

/// Primary command buffers, one per role
#[derive(Debug, Clone, Copy)]
pub struct CommandBuffers {
    pub graphics: vk::CommandBuffer,
    pub present: vk::CommandBuffer,
}

impl CommandBuffers {
    /// Allocate one primary buffer from each role's pool.
    ///
    /// With a shared pool the present buffer is a second allocation from it.
    /// Buffers go away with their pools, so nothing is pushed on the stack.
    pub fn allocate(device: &ash::Device, pools: &CommandPools) -> BringUpResult<Self> {
        Ok(Self {
            graphics: allocate_primary(device, pools.graphics)?,
            present: allocate_primary(device, pools.present)?,
        })
    }
}

fn allocate_primary(device: &ash::Device, pool: vk::CommandPool) -> BringUpResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
        .check("vkAllocateCommandBuffers")?;

    Ok(buffers[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BringUpError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeDriver {
        created: Vec<u32>,
        destroyed: Vec<u32>,
    }

    /// Run the plan against a fake driver whose pool handles are `100 + family`
    fn run(plan: &CommandPoolPlan) -> (CommandPools<u32>, TeardownStack, Rc<RefCell<FakeDriver>>) {
        let driver = Rc::new(RefCell::new(FakeDriver::default()));
        let mut teardown = TeardownStack::new();

        let creating = driver.clone();
        let pools = plan
            .create_with(
                &mut teardown,
                |family| {
                    creating.borrow_mut().created.push(family);
                    Ok(100 + family)
                },
                |pool| {
                    let driver = driver.clone();
                    move || driver.borrow_mut().destroyed.push(pool)
                },
            )
            .unwrap();

        (pools, teardown, driver)
    }

    #[test]
    fn shared_family_creates_one_pool_and_aliases_it() {
        let plan = CommandPoolPlan::new(0, 0);
        assert!(plan.is_shared());
        assert_eq!(plan.families(), [0]);

        let (pools, mut teardown, driver) = run(&plan);
        assert_eq!(driver.borrow().created, [0]);
        assert_eq!(teardown.len(), 1);
        assert_eq!(pools.graphics, pools.present);
        assert!(pools.shared);

        teardown.release_all();
        assert_eq!(driver.borrow().destroyed, [100]);
    }

    #[test]
    fn distinct_families_create_two_independent_pools() {
        let plan = CommandPoolPlan::new(0, 2);
        assert!(!plan.is_shared());
        assert_eq!(plan.families(), [0, 2]);

        let (pools, mut teardown, driver) = run(&plan);
        assert_eq!(driver.borrow().created, [0, 2]);
        assert_eq!(teardown.len(), 2);
        assert_eq!((pools.graphics, pools.present), (100, 102));
        assert!(!pools.shared);

        teardown.release_all();
        assert_eq!(driver.borrow().destroyed, [102, 100]);
    }

    #[test]
    fn failed_second_pool_keeps_release_for_the_first() {
        let plan = CommandPoolPlan::new(1, 3);
        let destroyed = Rc::new(RefCell::new(Vec::new()));
        let mut teardown = TeardownStack::new();

        let result = plan.create_with(
            &mut teardown,
            |family| {
                if family == 3 {
                    Err(BringUpError::Vulkan {
                        call: "vkCreateCommandPool",
                        result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                        location: std::panic::Location::caller(),
                    })
                } else {
                    Ok(family)
                }
            },
            |pool| {
                let destroyed = destroyed.clone();
                move || destroyed.borrow_mut().push(pool)
            },
        );

        assert!(result.is_err());
        assert_eq!(teardown.len(), 1);
        drop(teardown);
        assert_eq!(*destroyed.borrow(), [1]);
    }
}
