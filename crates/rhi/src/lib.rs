//! Render hardware interface for the gpuframe renderer.
//!
//! This crate expresses the explicit GPU object model (device, command
//! queue, command allocator, descriptor heap, fence) as a family of traits
//! and provides two implementations:
//! - [`vulkan`]: Vulkan 1.3 through `ash`
//! - [`headless`]: an in-memory device with a simulated GPU timeline, for tests
//!
//! Code above this crate is generic over [`Backend`].

mod error;

pub mod backend;
pub mod headless;
pub mod shader;
pub mod types;
pub mod vertex;
pub mod vulkan;

pub use backend::{
    Backend, Buffer, CommandAllocator, CommandList, CommandQueue, DescriptorHeap, Device, Fence,
    SwapChain, Texture, WindowHandle,
};
pub use error::{RhiError, RhiResult};
pub use types::*;
pub use vertex::Vertex;

// Re-export ash types that users might need
pub use ash::vk;
