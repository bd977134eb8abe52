//! Platform layer for the gpuframe renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation from raw window handles
//! - Monitor video modes and exclusive fullscreen

mod window;

pub use window::{Surface, VideoMode, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
