//! Vulkan logical device and queue management.
//!
//! [`Device`] owns the logical device, its graphics and present queues and
//! the gpu-allocator instance. Every other RHI object holds an
//! `Arc<Device>`, so the device outlives everything created from it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vkforge_rhi::device::Device;
//! use vkforge_rhi::instance::Instance;
//! use vkforge_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(false, &[]).expect("instance");
//! let info = select_physical_device(instance.handle(), None, &[]).expect("GPU");
//! let device = Device::new(&instance, &info, Duration::from_secs(5)).expect("device");
//! let queue = device.graphics_queue();
//! ```

use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Device extensions required for presenting to a surface.
pub const PRESENTATION_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Depth formats tried in order of preference.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan logical device wrapper.
///
/// Immutable after creation apart from the allocator, which sits behind a
/// `Mutex`, and the live allocation counter.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Dropped explicitly before the logical device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    graphics_family: u32,
    max_sample_count: vk::SampleCountFlags,
    sample_rate_shading: bool,
    wait_timeout: Duration,
    pub(crate) live_allocations: AtomicUsize,
}

impl Device {
    /// Creates the logical device for a selected physical device.
    ///
    /// One queue is requested per unique family among graphics and present.
    /// Sampler anisotropy is always enabled; sample-rate shading is enabled
    /// when the device supports it. `wait_timeout` bounds every fence wait
    /// issued through this device.
    ///
    /// # Errors
    ///
    /// - [`RhiError::CreationError`] if the driver rejects the device
    /// - [`RhiError::AllocatorError`] if gpu-allocator fails to initialize
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        wait_timeout: Duration,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::InvalidArgument(
                "physical device has incomplete queue families".to_string(),
            ));
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let supported = unsafe {
            instance
                .handle()
                .get_physical_device_features(physical_device_info.device)
        };
        let sample_rate_shading = supported.sample_rate_shading == vk::TRUE;
        if !sample_rate_shading {
            warn!("Sample-rate shading not supported by '{}'", physical_device_info.name);
        }

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .sample_rate_shading(sample_rate_shading);

        let extension_names: Vec<*const std::ffi::c_char> = physical_device_info
            .extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(RhiError::creation("logical device"))?
        };

        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            memory_properties: physical_device_info.memory_properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            graphics_family,
            max_sample_count: physical_device_info.max_sample_count(),
            sample_rate_shading,
            wait_timeout,
            live_allocations: AtomicUsize::new(0),
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance the device was created from.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Family of [`Self::graphics_queue`].
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Highest sample count usable for both color and depth attachments.
    #[inline]
    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        self.max_sample_count
    }

    /// Whether sample-rate shading was enabled at creation.
    #[inline]
    pub fn sample_rate_shading(&self) -> bool {
        self.sample_rate_shading
    }

    /// Upper bound applied to fence waits and single-time submissions.
    #[inline]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Number of memory allocations currently held by buffers and images.
    #[inline]
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::Acquire)
    }

    /// Locks the memory allocator.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::AllocationError("allocator mutex poisoned".to_string()))
    }

    /// Blocks until all queues are idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, and `fence`, if not null,
    /// must be unsignaled and not in use by another submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Format properties of `format` on this device.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// First format in `candidates` supporting `features` with `tiling`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = self.format_properties(format);
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    _ => props.optimal_tiling_features.contains(features),
                }
            })
            .ok_or(RhiError::UnsupportedFormat {
                format: candidates.first().copied().unwrap_or(vk::Format::UNDEFINED),
                feature: "requested tiling features",
            })
    }

    /// Depth format usable as an optimal-tiling depth attachment.
    pub fn depth_format(&self) -> RhiResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }
}

/// Whether a depth format carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let live = self.live_allocations();
            if live != 0 {
                warn!("{} allocation(s) still live at device destruction", live);
            }

            // Allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: handles are plain values, ash::Device/Instance are function
// tables, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_extensions() {
        assert_eq!(PRESENTATION_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_depth_candidates_order() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert!(!has_stencil_component(DEPTH_FORMAT_CANDIDATES[0]));
        assert!(has_stencil_component(DEPTH_FORMAT_CANDIDATES[1]));
        assert!(has_stencil_component(DEPTH_FORMAT_CANDIDATES[2]));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
