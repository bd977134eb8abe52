//! Depth-stencil buffer management.
//!
//! The depth buffer is a GPU texture plus a one-slot depth-stencil heap that
//! holds its view. It always matches the swap chain extent: whenever the
//! back buffers are recreated, [`DepthBuffer::resize`] recreates the texture
//! and rewrites the view.
//!
//! # Overview
//!
//! - [`DepthBuffer`] owns the texture and its heap
//! - Uses [`DEFAULT_DEPTH_FORMAT`] (32-bit floating point) by default
//! - A freshly created texture starts in the common state; the first frame
//!   that uses it records the transition to depth-write

use std::sync::Arc;

use tracing::{debug, info};

use gpuframe_rhi::{
    AttachmentView, Backend, CommandList as _, DescriptorHeap as _, DescriptorHeapDesc,
    DescriptorHeapKind, Device as _, Extent2D, Format, ResourceState, RhiError, RhiResult,
    Texture as _, TextureDesc,
};

/// Default depth buffer format (32-bit floating point).
pub const DEFAULT_DEPTH_FORMAT: Format = Format::D32Float;

/// Depth value written by the per-frame clear (far plane).
pub const DEPTH_CLEAR_VALUE: f32 = 1.0;

/// Depth-stencil texture and its view.
///
/// # Resource Destruction
///
/// The heap is declared before the texture so the view is released before
/// the image it points at.
pub struct DepthBuffer<B: Backend> {
    heap: B::DescriptorHeap,
    texture: B::Texture,
    format: Format,
    /// Set when the texture was (re)created and has not been used yet.
    needs_transition: bool,
}

impl<B: Backend> DepthBuffer<B> {
    /// Creates a depth buffer with the specified extent and format.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `extent` is empty or `format` is not a depth format
    /// - Texture or heap creation fails
    pub fn new(device: &Arc<B::Device>, extent: Extent2D, format: Format) -> RhiResult<Self> {
        if !format.is_depth() {
            return Err(RhiError::InvalidArgument(format!(
                "{:?} is not a depth format",
                format
            )));
        }

        let mut heap = device.create_descriptor_heap(&DescriptorHeapDesc {
            kind: DescriptorHeapKind::DepthStencil,
            capacity: 1,
            shader_visible: false,
        })?;
        let texture = Self::create_texture(device, &mut heap, extent, format)?;

        info!("Created depth buffer: {} ({:?})", extent, format);

        Ok(Self {
            heap,
            texture,
            format,
            needs_transition: true,
        })
    }

    /// Creates a depth buffer with [`DEFAULT_DEPTH_FORMAT`].
    pub fn with_default_format(device: &Arc<B::Device>, extent: Extent2D) -> RhiResult<Self> {
        Self::new(device, extent, DEFAULT_DEPTH_FORMAT)
    }

    fn create_texture(
        device: &Arc<B::Device>,
        heap: &mut B::DescriptorHeap,
        extent: Extent2D,
        format: Format,
    ) -> RhiResult<B::Texture> {
        if extent.is_empty() {
            return Err(RhiError::InvalidArgument(format!(
                "depth buffer extent must be non-zero, got {}",
                extent
            )));
        }
        let texture = device.create_texture(&TextureDesc::depth_stencil(extent, format))?;
        device.create_depth_stencil_view(heap, 0, &texture)?;
        Ok(texture)
    }

    /// Recreates the texture at `extent`. The GPU must not be using the old one.
    pub fn resize(&mut self, device: &Arc<B::Device>, extent: Extent2D) -> RhiResult<()> {
        self.heap.reset();
        self.texture = Self::create_texture(device, &mut self.heap, extent, self.format)?;
        self.needs_transition = true;
        debug!("Resized depth buffer to {}", extent);
        Ok(())
    }

    /// The depth-stencil view of the current texture.
    pub fn view(&self) -> RhiResult<AttachmentView> {
        self.heap.attachment(0).ok_or_else(|| {
            RhiError::Internal("depth-stencil heap slot 0 holds no view".to_string())
        })
    }

    /// Records the common to depth-write transition if the texture is new.
    pub fn record_initial_transition(&mut self, list: &mut B::CommandList) {
        if self.needs_transition {
            list.transition_barrier(
                self.texture.image(),
                ResourceState::Common,
                ResourceState::DepthWrite,
            );
            self.needs_transition = false;
        }
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.texture.desc().extent
    }

    pub fn texture(&self) -> &B::Texture {
        &self.texture
    }

    pub fn heap(&self) -> &B::DescriptorHeap {
        &self.heap
    }
}
