//! Top-level error type.

use thiserror::Error;

/// Engine-level error type.
///
/// Layer-specific errors (`RhiError`, `ResourceError`) convert into this at
/// the boundary where they reach the host loop.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
