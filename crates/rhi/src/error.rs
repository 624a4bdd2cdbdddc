//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Enumeration returned no physical devices at all
    #[error("No Vulkan-capable device found")]
    NoDevice,

    /// Every enumerated device failed at least one suitability predicate
    #[error("None of the {candidates} enumerated device(s) is suitable")]
    NoSuitableDevice { candidates: usize },

    /// A required instance or device extension is missing
    #[error("Extension not available: {0}")]
    MissingExtension(String),

    /// No memory type satisfies the type filter and property flags
    #[error("Allocation error: {0}")]
    AllocationError(String),

    /// The driver rejected creation of an object
    #[error("Failed to create {object}: {result}")]
    CreationError {
        object: &'static str,
        result: vk::Result,
    },

    /// Shader blob rejected
    #[error("Shader module error: {0}")]
    ShaderModuleError(String),

    /// Window surface could not be created
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain negotiation error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Layout pair outside the supported transition table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// Format lacks a required feature
    #[error("Format {format:?} does not support {feature}")]
    UnsupportedFormat {
        format: vk::Format,
        feature: &'static str,
    },

    /// Presentation chain is out of date or suboptimal and must be recreated
    #[error("Presentation chain is stale")]
    PresentationStale,

    /// A bounded wait expired or the driver reported device loss
    #[error("Device lost while waiting for {0}")]
    DeviceLost(&'static str),

    /// Caller passed an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RhiError {
    /// Returns `true` for the single condition handled inline by recreation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PresentationStale)
    }

    /// Adapter for `map_err` at object creation sites.
    pub fn creation(object: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::CreationError { object, result }
    }

    /// Map the result of a bounded wait.
    pub(crate) fn from_wait(what: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost(what),
            other => Self::VulkanError(other),
        }
    }
}

/// Reason a physical device failed selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuitabilityError {
    #[error("no queue family supports graphics")]
    MissingGraphicsQueue,

    #[error("no queue family can present to the surface")]
    MissingPresentQueue,

    #[error("missing device extension {0}")]
    MissingExtension(String),

    #[error("surface reports no formats or no present modes")]
    InadequateSwapchain,

    #[error("sampler anisotropy is not supported")]
    NoAnisotropy,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stale_presentation_is_recoverable() {
        assert!(RhiError::PresentationStale.is_recoverable());
        assert!(!RhiError::DeviceLost("fence").is_recoverable());
        assert!(!RhiError::NoDevice.is_recoverable());
        assert!(!RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR).is_recoverable());
    }

    #[test]
    fn test_wait_timeout_maps_to_device_lost() {
        assert!(matches!(
            RhiError::from_wait("fence", vk::Result::TIMEOUT),
            RhiError::DeviceLost("fence")
        ));
        assert!(matches!(
            RhiError::from_wait("fence", vk::Result::ERROR_DEVICE_LOST),
            RhiError::DeviceLost(_)
        ));
        assert!(matches!(
            RhiError::from_wait("fence", vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            RhiError::VulkanError(_)
        ));
    }

    #[test]
    fn test_creation_adapter() {
        let err = RhiError::creation("buffer")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(
            err.to_string(),
            "Failed to create buffer: ERROR_OUT_OF_DEVICE_MEMORY"
        );
    }
}
