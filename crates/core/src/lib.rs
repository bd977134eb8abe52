//! Core utilities for the gpuframe crates.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timer
//! - Renderer configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::Timer;
