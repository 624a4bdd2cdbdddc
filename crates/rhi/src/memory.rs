//! Device memory selection and allocation bookkeeping.
//!
//! Buffers and images request memory by property flags. Before handing the
//! request to gpu-allocator, [`find_memory_type`] checks that the device
//! exposes a memory type matching both the resource's type filter and the
//! requested flags.

use std::sync::atomic::Ordering;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{error, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Index of the first memory type allowed by `type_filter` that has every
/// flag in `required`.
///
/// # Errors
///
/// [`RhiError::AllocationError`] if no memory type qualifies.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_filter & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or_else(|| {
            RhiError::AllocationError(format!(
                "no memory type matches filter {type_filter:#b} with {required:?}"
            ))
        })
}

/// Allocator location matching a set of property flags.
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        if properties.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
            MemoryLocation::GpuToCpu
        } else {
            MemoryLocation::CpuToGpu
        }
    } else {
        MemoryLocation::GpuOnly
    }
}

impl Device {
    /// Allocates memory for a resource and counts it as live.
    ///
    /// `linear` is true for buffers and linear-tiled images.
    pub(crate) fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        linear: bool,
    ) -> RhiResult<Allocation> {
        find_memory_type(
            self.memory_properties(),
            requirements.memory_type_bits,
            properties,
        )?;

        let allocation = self.allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: memory_location(properties),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        self.live_allocations.fetch_add(1, Ordering::AcqRel);
        trace!(
            "Allocated {} bytes for '{}' ({:?})",
            requirements.size, name, properties
        );
        Ok(allocation)
    }

    /// Returns memory to the allocator. Errors are logged, not propagated,
    /// since this runs from `Drop`.
    pub(crate) fn free_memory(&self, allocation: Allocation) {
        match self.allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free allocation: {:?}", e);
                }
            }
            Err(e) => error!("Failed to free allocation: {}", e),
        }
        self.live_allocations.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
            slot.heap_index = 0;
        }
        props
    }

    #[test]
    fn test_find_memory_type_respects_filter_and_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        // Type 0 excluded by the filter
        assert_eq!(
            find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            2
        );
    }

    #[test]
    fn test_find_memory_type_no_match() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(RhiError::AllocationError(_))));

        // Matching flags but filtered out
        let result = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(matches!(result, Err(RhiError::AllocationError(_))));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let result = find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_location_mapping() {
        assert_eq!(
            memory_location(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED
            ),
            MemoryLocation::GpuToCpu
        );
    }
}
