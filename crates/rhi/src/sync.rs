//! Synchronization primitives.
//!
//! - [`Semaphore`] orders work between queue submissions on the GPU
//! - [`Fence`] lets the host wait for GPU work, always with a bound
//! - [`FrameSync`] groups the three objects one frame slot needs
//!
//! A fence wait that exceeds the device's wait timeout is reported as
//! [`RhiError::DeviceLost`] instead of blocking forever.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Converts a timeout to the nanosecond count Vulkan expects.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, None)
                .map_err(RhiError::creation("semaphore"))?
        };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence. A signaled fence lets the first wait pass at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe {
            device
                .handle()
                .create_fence(&create_info, None)
                .map_err(RhiError::creation("fence"))?
        };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits using the device's configured timeout.
    pub fn wait(&self) -> RhiResult<()> {
        self.wait_for(self.device.wait_timeout())
    }

    /// Waits at most `timeout` for the fence to signal.
    ///
    /// # Errors
    ///
    /// [`RhiError::DeviceLost`] if the timeout expires or the device is lost.
    pub fn wait_for(&self, timeout: Duration) -> RhiResult<()> {
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_nanos(timeout))
        };
        result.map_err(|e| {
            error!("Fence wait failed after {:?}: {}", timeout, e);
            RhiError::from_wait("fence", e)
        })
    }

    /// Returns the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame-in-flight slot.
///
/// ```text
/// wait in_flight -> acquire (signals image_acquired) -> reset in_flight
///   -> submit (waits image_acquired, signals render_finished + in_flight)
///   -> present (waits render_finished)
/// ```
pub struct FrameSync {
    image_acquired: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    /// The fence starts signaled so the slot's first wait returns at once.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_acquired = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        debug!("Created frame synchronization primitives");

        Ok(Self {
            image_acquired,
            render_finished,
            in_flight,
        })
    }

    #[inline]
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}
