//! Renderer error types.

use std::fmt;

use thiserror::Error;

use gpuframe_rhi::{DescriptorHeapKind, RhiError};

use crate::frame_state::FrameState;

/// The initialization step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStage {
    Device,
    CommandQueue,
    CommandAllocator,
    CommandList,
    Fence,
    SwapChain,
    DepthStencil,
    ConstantBuffer,
    DescriptorHeaps,
    Shaders,
    RootSignature,
    PipelineState,
}

impl InitStage {
    pub fn name(self) -> &'static str {
        match self {
            InitStage::Device => "device",
            InitStage::CommandQueue => "command queue",
            InitStage::CommandAllocator => "command allocator",
            InitStage::CommandList => "command list",
            InitStage::Fence => "fence",
            InitStage::SwapChain => "swap chain",
            InitStage::DepthStencil => "depth-stencil buffer",
            InitStage::ConstantBuffer => "constant buffer",
            InitStage::DescriptorHeaps => "descriptor heaps",
            InitStage::Shaders => "shaders",
            InitStage::RootSignature => "root signature",
            InitStage::PipelineState => "pipeline state",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renderer-level error type.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A GPU object could not be created during `init`; the renderer does not exist.
    #[error("Renderer initialization failed at {stage}: {source}")]
    Init {
        stage: InitStage,
        #[source]
        source: RhiError,
    },

    /// Configuration rejected before any GPU object was created
    #[error("Invalid configuration: {0}")]
    Config(#[from] gpuframe_core::Error),

    /// A registry's descriptor heap is full
    #[error("{heap} heap is full ({capacity} descriptors)")]
    CapacityExceeded {
        heap: DescriptorHeapKind,
        capacity: u32,
    },

    /// An operation was called out of order; the state is unchanged
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: FrameState,
    },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device was removed; the renderer must be dropped and re-initialized
    #[error("Device lost")]
    DeviceLost,

    /// Non-fatal failure reported by the RHI
    #[error(transparent)]
    Rhi(RhiError),
}

impl From<RhiError> for RendererError {
    fn from(error: RhiError) -> Self {
        if error.is_device_lost() {
            RendererError::DeviceLost
        } else {
            RendererError::Rhi(error)
        }
    }
}

impl RendererError {
    /// Maps an RHI failure during `init` to the stage it happened in.
    pub(crate) fn init(stage: InitStage) -> impl FnOnce(RhiError) -> RendererError {
        move |source| RendererError::Init { stage, source }
    }

    pub fn is_device_lost(&self) -> bool {
        match self {
            RendererError::DeviceLost => true,
            RendererError::Init { source, .. } => source.is_device_lost(),
            _ => false,
        }
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_loss_is_lifted() {
        let error = RendererError::from(RhiError::DeviceLost);
        assert!(matches!(error, RendererError::DeviceLost));

        let error = RendererError::from(RhiError::Timeout(4));
        assert!(matches!(error, RendererError::Rhi(RhiError::Timeout(4))));
        assert!(!error.is_device_lost());
    }

    #[test]
    fn test_init_error_names_stage() {
        let error = RendererError::init(InitStage::Shaders)(RhiError::ShaderError(
            "bad".to_string(),
        ));
        let message = error.to_string();
        assert!(message.contains("shaders"), "{message}");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_capacity_message() {
        let error = RendererError::CapacityExceeded {
            heap: DescriptorHeapKind::Sampler,
            capacity: 16,
        };
        assert!(error.to_string().contains("16"));
    }
}
