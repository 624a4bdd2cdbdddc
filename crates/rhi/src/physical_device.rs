//! Physical device (GPU) selection.
//!
//! Selection is first-match: devices are checked in enumeration order and
//! the first one passing every predicate wins. There is no ranking.
//!
//! The predicates run over [`DeviceCandidate`], a plain description of a
//! physical device, so they can be exercised without a driver.
//!
//! # Example
//!
//! ```no_run
//! use vkforge_rhi::instance::Instance;
//! use vkforge_rhi::physical_device::{SurfaceTarget, select_physical_device};
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("instance");
//! let loader = instance.surface_loader();
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // from the window
//! let target = SurfaceTarget { loader: &loader, surface };
//!
//! let info = select_physical_device(
//!     instance.handle(),
//!     Some(&target),
//!     &[ash::khr::swapchain::NAME],
//! )
//! .expect("no suitable GPU");
//! println!("Selected GPU: {}", info.name);
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult, SuitabilityError};

/// A surface together with the loader used to query it.
#[derive(Clone, Copy)]
pub struct SurfaceTarget<'a> {
    pub loader: &'a ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

/// Queue family indices chosen for a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present families are known.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices, graphics first.
    ///
    /// One queue is created per entry when building the logical device.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Capabilities of one queue family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub queue_count: u32,
    pub graphics: bool,
    pub present: bool,
}

/// Driver-independent description of a physical device.
#[derive(Clone, Debug, Default)]
pub struct DeviceCandidate {
    pub name: String,
    pub queue_families: Vec<QueueFamilyCaps>,
    pub extensions: Vec<String>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub sampler_anisotropy: bool,
}

impl DeviceCandidate {
    /// Queries a physical device. Surface-related fields stay empty when
    /// `surface` is `None`.
    pub fn query(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface: Option<&SurfaceTarget<'_>>,
    ) -> RhiResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };

        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let mut queue_families = Vec::with_capacity(families.len());
        for (index, family) in families.iter().enumerate() {
            let present = match surface {
                Some(target) => unsafe {
                    target.loader.get_physical_device_surface_support(
                        device,
                        index as u32,
                        target.surface,
                    )?
                },
                None => false,
            };
            queue_families.push(QueueFamilyCaps {
                queue_count: family.queue_count,
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            });
        }

        let (surface_format_count, present_mode_count) = match surface {
            Some(target) => unsafe {
                (
                    target
                        .loader
                        .get_physical_device_surface_formats(device, target.surface)?
                        .len(),
                    target
                        .loader
                        .get_physical_device_surface_present_modes(device, target.surface)?
                        .len(),
                )
            },
            None => (0, 0),
        };

        Ok(Self {
            name,
            queue_families,
            extensions: extensions
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
            surface_format_count,
            present_mode_count,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        })
    }

    /// Picks graphics and present families.
    ///
    /// A family supporting both is preferred; otherwise the first family of
    /// each kind is used. Without presentation the present family mirrors
    /// the graphics family.
    pub fn find_queue_families(&self, presentation: bool) -> QueueFamilyIndices {
        let usable = || {
            self.queue_families
                .iter()
                .enumerate()
                .filter(|(_, f)| f.queue_count > 0)
                .map(|(i, f)| (i as u32, f))
        };

        if !presentation {
            let graphics = usable().find(|(_, f)| f.graphics).map(|(i, _)| i);
            return QueueFamilyIndices {
                graphics_family: graphics,
                present_family: graphics,
            };
        }

        if let Some((shared, _)) = usable().find(|(_, f)| f.graphics && f.present) {
            return QueueFamilyIndices {
                graphics_family: Some(shared),
                present_family: Some(shared),
            };
        }

        QueueFamilyIndices {
            graphics_family: usable().find(|(_, f)| f.graphics).map(|(i, _)| i),
            present_family: usable().find(|(_, f)| f.present).map(|(i, _)| i),
        }
    }

    /// Runs the suitability predicates in order and returns the queue
    /// families on success.
    pub fn check(
        &self,
        required_extensions: &[&CStr],
        presentation: bool,
    ) -> Result<QueueFamilyIndices, SuitabilityError> {
        let indices = self.find_queue_families(presentation);

        if indices.graphics_family.is_none() {
            return Err(SuitabilityError::MissingGraphicsQueue);
        }
        if indices.present_family.is_none() {
            return Err(SuitabilityError::MissingPresentQueue);
        }

        for required in required_extensions {
            let required = required.to_string_lossy();
            if !self.extensions.iter().any(|ext| *ext == required) {
                return Err(SuitabilityError::MissingExtension(required.into_owned()));
            }
        }

        if presentation && (self.surface_format_count == 0 || self.present_mode_count == 0) {
            return Err(SuitabilityError::InadequateSwapchain);
        }

        if !self.sampler_anisotropy {
            return Err(SuitabilityError::NoAnisotropy);
        }

        Ok(indices)
    }
}

/// Returns the index of the first suitable candidate and its queue families.
///
/// # Errors
///
/// - [`RhiError::NoDevice`] if `candidates` is empty
/// - [`RhiError::NoSuitableDevice`] if every candidate fails a predicate
pub fn choose_first_suitable(
    candidates: &[DeviceCandidate],
    required_extensions: &[&CStr],
    presentation: bool,
) -> RhiResult<(usize, QueueFamilyIndices)> {
    if candidates.is_empty() {
        return Err(RhiError::NoDevice);
    }

    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.check(required_extensions, presentation) {
            Ok(indices) => return Ok((index, indices)),
            Err(reason) => debug!("GPU '{}' skipped: {}", candidate.name, reason),
        }
    }

    Err(RhiError::NoSuitableDevice {
        candidates: candidates.len(),
    })
}

/// Highest sample count supported by both color and depth framebuffers.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts =
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// The selected physical device and what the logical device needs from it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
    /// Device extensions to enable, all verified present.
    pub extensions: Vec<&'static CStr>,
}

impl PhysicalDeviceInfo {
    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        max_usable_sample_count(&self.properties.limits)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.name)
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// Enumerates physical devices and returns the first suitable one.
///
/// With `surface == None` the presentation predicates are skipped, which
/// allows headless use.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: Option<&SurfaceTarget<'_>>,
    required_extensions: &[&'static CStr],
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let candidates = devices
        .iter()
        .map(|&device| DeviceCandidate::query(instance, device, surface))
        .collect::<RhiResult<Vec<_>>>()?;

    let (index, queue_families) =
        choose_first_suitable(&candidates, required_extensions, surface.is_some()).inspect_err(
            |e| warn!("Physical device selection failed: {}", e),
        )?;

    let device = devices[index];
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let selected = PhysicalDeviceInfo {
        device,
        name: candidates[index].name.clone(),
        properties,
        memory_properties,
        queue_families,
        extensions: required_extensions.to_vec(),
    };

    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}, max samples {:?}",
        selected.name,
        selected.device_type_name(),
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        selected.max_sample_count(),
    );

    Ok(selected)
}
