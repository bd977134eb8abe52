//! Error types shared by the gpuframe crates.

use thiserror::Error;

/// Error type for configuration, windowing and IO failures outside the GPU layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan surface or loader errors raised before a device exists
    #[error("Surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration value out of range
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
