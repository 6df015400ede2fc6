// Synchronization primitives
//
// One semaphore pair and one fence per swapchain image, provisioned for a
// frame loop that submits and presents.

use ash::vk;

use super::error::{BringUpResult, VkResultExt};
use super::teardown::TeardownStack;

/// Creates and destroys the objects a `FrameSync` is made of
pub trait SyncDriver {
    type Semaphore: Copy + 'static;
    type Fence: Copy + 'static;

    fn new_semaphore(&self) -> BringUpResult<Self::Semaphore>;
    /// Fences start signaled so a first wait returns immediately
    fn new_fence(&self) -> BringUpResult<Self::Fence>;
    fn free_semaphore(&self, semaphore: Self::Semaphore);
    fn free_fence(&self, fence: Self::Fence);
}

impl SyncDriver for ash::Device {
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;

    fn new_semaphore(&self) -> BringUpResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.create_semaphore(&semaphore_info, None) }.check("vkCreateSemaphore")
    }

    fn new_fence(&self) -> BringUpResult<vk::Fence> {
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        unsafe { self.create_fence(&fence_info, None) }.check("vkCreateFence")
    }

    fn free_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.destroy_semaphore(semaphore, None) };
    }

    fn free_fence(&self, fence: vk::Fence) {
        unsafe { self.destroy_fence(fence, None) };
    }
}

/// Frame synchronization - one per swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync<S = vk::Semaphore, F = vk::Fence> {
    pub image_available: S,
    pub render_finished: S,
    pub in_flight_fence: F,
}

impl<S: Copy + 'static, F: Copy + 'static> FrameSync<S, F> {
    /// Create one set. Whatever was created before a failure is destroyed again.
    pub fn new<D>(driver: &D) -> BringUpResult<Self>
    where
        D: SyncDriver<Semaphore = S, Fence = F>,
    {
        let image_available = driver.new_semaphore()?;
        let render_finished = match driver.new_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                driver.free_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight_fence = match driver.new_fence() {
            Ok(fence) => fence,
            Err(e) => {
                driver.free_semaphore(render_finished);
                driver.free_semaphore(image_available);
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
        })
    }

    /// Create `count` frames and register one bulk release for all of them
    pub fn create_all<D>(driver: &D, count: usize, teardown: &mut TeardownStack) -> BringUpResult<Vec<Self>>
    where
        D: SyncDriver<Semaphore = S, Fence = F> + Clone + 'static,
    {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match Self::new(driver) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    // Nothing is on the stack for these yet
                    for frame in frames.iter().rev() {
                        frame.destroy(driver);
                    }
                    return Err(e);
                }
            }
        }

        let release_driver = driver.clone();
        let release_frames = frames.clone();
        teardown.push("sync objects", move || {
            for frame in release_frames.iter().rev() {
                frame.destroy(&release_driver);
            }
        });

        log::info!("Created {} frame sync sets", frames.len());
        Ok(frames)
    }

    pub fn destroy<D>(&self, driver: &D)
    where
        D: SyncDriver<Semaphore = S, Fence = F>,
    {
        driver.free_fence(self.in_flight_fence);
        driver.free_semaphore(self.render_finished);
        driver.free_semaphore(self.image_available);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BringUpError;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Hands out increasing ids; creation number `fail_at` fails
    #[derive(Default)]
    struct Objects {
        next: u32,
        fail_at: Option<u32>,
        live: Vec<u32>,
        destroyed: Vec<u32>,
    }

    #[derive(Clone, Default)]
    struct RecordingDriver(Rc<RefCell<Objects>>);

    impl RecordingDriver {
        fn failing_at(creation: u32) -> Self {
            let driver = Self::default();
            driver.0.borrow_mut().fail_at = Some(creation);
            driver
        }

        fn create(&self, call: &'static str) -> BringUpResult<u32> {
            let mut objects = self.0.borrow_mut();
            let id = objects.next;
            objects.next += 1;
            if objects.fail_at == Some(id) {
                return Err(BringUpError::Vulkan {
                    call,
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                    location: std::panic::Location::caller(),
                });
            }
            objects.live.push(id);
            Ok(id)
        }

        fn free(&self, id: u32) {
            let mut objects = self.0.borrow_mut();
            objects.live.retain(|&live| live != id);
            objects.destroyed.push(id);
        }

        fn live(&self) -> Vec<u32> {
            self.0.borrow().live.clone()
        }

        fn destroyed(&self) -> Vec<u32> {
            self.0.borrow().destroyed.clone()
        }
    }

    impl SyncDriver for RecordingDriver {
        type Semaphore = u32;
        type Fence = u32;

        fn new_semaphore(&self) -> BringUpResult<u32> {
            self.create("vkCreateSemaphore")
        }

        fn new_fence(&self) -> BringUpResult<u32> {
            self.create("vkCreateFence")
        }

        fn free_semaphore(&self, semaphore: u32) {
            self.free(semaphore);
        }

        fn free_fence(&self, fence: u32) {
            self.free(fence);
        }
    }

    #[test]
    fn one_bulk_entry_releases_every_frame() {
        let driver = RecordingDriver::default();
        let mut teardown = TeardownStack::new();

        let frames = FrameSync::create_all(&driver, 3, &mut teardown).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[1],
            FrameSync {
                image_available: 3,
                render_finished: 4,
                in_flight_fence: 5,
            }
        );
        assert_eq!(teardown.labels().collect::<Vec<_>>(), ["sync objects"]);
        assert_eq!(driver.live().len(), 9);

        teardown.release_all();
        assert!(driver.live().is_empty());
        assert_eq!(driver.destroyed(), [8, 7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn failure_on_later_frame_destroys_earlier_frames() {
        // Creation 6 is frame 2's first semaphore
        let driver = RecordingDriver::failing_at(6);
        let mut teardown = TeardownStack::new();

        let result = FrameSync::create_all(&driver, 4, &mut teardown);
        assert!(matches!(
            result,
            Err(BringUpError::Vulkan { call: "vkCreateSemaphore", .. })
        ));
        assert!(teardown.is_empty());
        assert!(driver.live().is_empty());
        assert_eq!(driver.destroyed(), [5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn failed_fence_destroys_both_semaphores_of_its_frame() {
        let driver = RecordingDriver::failing_at(2);

        let result = FrameSync::new(&driver);
        assert!(matches!(result, Err(BringUpError::Vulkan { call: "vkCreateFence", .. })));
        assert!(driver.live().is_empty());
        assert_eq!(driver.destroyed(), [1, 0]);
    }

    #[test]
    fn failed_second_semaphore_destroys_the_first() {
        let driver = RecordingDriver::failing_at(1);

        assert!(FrameSync::new(&driver).is_err());
        assert!(driver.live().is_empty());
        assert_eq!(driver.destroyed(), [0]);
    }
}
