//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader compilation error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid argument or handle
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A fence wait exceeded its bound
    #[error("Timed out waiting for fence value {0}")]
    Timeout(u64),

    /// Backend bookkeeping failure not caused by the caller
    #[error("Internal error: {0}")]
    Internal(String),

    /// The device was removed or reset; every object created from it is unusable
    #[error("Device lost")]
    DeviceLost,
}

impl From<ash::vk::Result> for RhiError {
    fn from(result: ash::vk::Result) -> Self {
        match result {
            ash::vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::VulkanError(other),
        }
    }
}

impl From<gpuframe_core::Error> for RhiError {
    fn from(error: gpuframe_core::Error) -> Self {
        RhiError::SurfaceError(error.to_string())
    }
}

impl RhiError {
    /// Whether the error means the device can no longer be used.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::DeviceLost)
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_maps_from_vulkan() {
        let error = RhiError::from(ash::vk::Result::ERROR_DEVICE_LOST);
        assert!(error.is_device_lost());

        let error = RhiError::from(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(error, RhiError::VulkanError(_)));
        assert!(!error.is_device_lost());
    }
}
