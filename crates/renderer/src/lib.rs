//! Fence-gated GPU frame orchestration.
//!
//! This crate drives one window's worth of rendering on top of the RHI:
//! - [`Renderer`]: device ownership, the frame protocol and its state machine
//! - [`SwapChain`]: back buffers and their render-target views
//! - [`FrameManager`]: per-slot command allocators and fence values
//! - [`UploadBuffer`]: typed CPU-to-GPU constant data
//! - [`TextureRegistry`] / [`SamplerRegistry`]: append-only descriptor slots
//! - [`DrawableAsset`]: buffer handles of one drawable object
//!
//! The renderer is generic over [`gpuframe_rhi::Backend`]; use
//! `Renderer<Vulkan>` on a real GPU and `Renderer<Headless>` in tests.

pub mod depth_buffer;
pub mod drawable;
pub mod error;
pub mod frame;
pub mod frame_state;
pub mod pass_constants;
pub mod registry;
pub mod renderer;
pub mod swap_chain;
pub mod upload_buffer;

pub use depth_buffer::{DEFAULT_DEPTH_FORMAT, DepthBuffer};
pub use drawable::{DrawCall, DrawableAsset};
pub use error::{InitStage, RendererError, RendererResult};
pub use frame::{FrameContext, FrameManager};
pub use frame_state::{FrameState, Operation, Pass};
pub use pass_constants::PassConstants;
pub use registry::{Registry, SamplerRegistry, TextureRegistry};
pub use renderer::{Renderer, ShaderSources};
pub use swap_chain::{SwapChain, best_display_mode};
pub use upload_buffer::{CONSTANT_BUFFER_ALIGNMENT, UploadBuffer};
