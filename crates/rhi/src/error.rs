//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Programming-contract violations (writing to an unmapped buffer, reusing a
/// binding index, mismatched command streams) are not represented here; they
/// panic with a descriptive message, since they indicate a caller bug rather
/// than a runtime condition.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Swapchain error, including a render-target format change on rebuild
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// Shader module error
    #[error("Shader error: {0}")]
    Shader(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
