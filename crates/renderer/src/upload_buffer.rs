//! Typed, persistently mapped CPU-to-GPU buffers.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::debug;

use gpuframe_rhi::{Backend, Buffer as _, BufferDesc, BufferUsage, Device as _, RhiError, RhiResult};

use crate::error::{RendererError, RendererResult};

/// Required alignment of a constant buffer view's offset and size.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Rounds `size` up to a multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

/// `len` elements of `T`, each written independently by the CPU and read by
/// the GPU.
///
/// Constant buffers pad every element to [`CONSTANT_BUFFER_ALIGNMENT`] so an
/// element can be bound on its own. Writes are plain memory copies: the
/// caller guarantees the GPU is not reading the element being written.
pub struct UploadBuffer<B: Backend, T: Pod> {
    buffer: B::Buffer,
    len: u32,
    stride: u64,
    _marker: PhantomData<T>,
}

impl<B: Backend, T: Pod> UploadBuffer<B, T> {
    /// Creates a buffer for `len` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero, `T` is zero-sized, or the device
    /// cannot allocate the buffer.
    pub fn new(device: &Arc<B::Device>, len: u32, usage: BufferUsage) -> RhiResult<Self> {
        let element_size = std::mem::size_of::<T>() as u64;
        if len == 0 || element_size == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "upload buffer needs at least one non-empty element ({} x {} bytes)",
                len, element_size
            )));
        }

        let stride = match usage {
            BufferUsage::Constant => align_up(element_size, CONSTANT_BUFFER_ALIGNMENT),
            BufferUsage::Vertex | BufferUsage::Index => element_size,
        };
        let buffer = device.create_buffer(&BufferDesc {
            size: stride * len as u64,
            usage,
        })?;

        debug!(
            "Created {} upload buffer: {} x {} bytes (element {} bytes)",
            usage.name(),
            len,
            stride,
            element_size
        );

        Ok(Self {
            buffer,
            len,
            stride,
            _marker: PhantomData,
        })
    }

    /// Copies `value` into element `index`.
    pub fn copy_data(&mut self, index: u32, value: &T) -> RendererResult<()> {
        if index >= self.len {
            return Err(RendererError::InvalidArgument(format!(
                "upload buffer index {} out of range ({} elements)",
                index, self.len
            )));
        }
        self.buffer
            .write(self.byte_offset(index), bytemuck::bytes_of(value))?;
        Ok(())
    }

    /// Byte offset of element `index` inside the buffer.
    #[inline]
    pub fn byte_offset(&self, index: u32) -> u64 {
        index as u64 * self.stride
    }

    /// Distance between elements, including padding.
    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffer(&self) -> &B::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use gpuframe_rhi::{Buffer as _, DeviceDesc};
    use gpuframe_rhi::headless::{Headless, HeadlessDevice, HeadlessWindow};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Small {
        a: u32,
        b: f32,
    }

    fn device() -> Arc<HeadlessDevice> {
        Headless::create_device(&HeadlessWindow::new(64, 64), &DeviceDesc::default()).unwrap()
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(240, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_constant_elements_are_padded() {
        let buffer = UploadBuffer::<Headless, Small>::new(&device(), 3, BufferUsage::Constant).unwrap();
        assert_eq!(buffer.stride(), 256);
        assert_eq!(buffer.byte_offset(2), 512);
        assert_eq!(buffer.buffer().desc().size, 768);
    }

    #[test]
    fn test_vertex_elements_are_packed() {
        let buffer = UploadBuffer::<Headless, Small>::new(&device(), 4, BufferUsage::Vertex).unwrap();
        assert_eq!(buffer.stride(), 8);
        assert_eq!(buffer.buffer().desc().size, 32);
    }

    #[test]
    fn test_copy_data_lands_at_element_offset() {
        let mut buffer =
            UploadBuffer::<Headless, Small>::new(&device(), 2, BufferUsage::Constant).unwrap();
        let value = Small { a: 7, b: 1.5 };
        buffer.copy_data(1, &value).unwrap();

        let bytes = buffer.buffer().read(256, 8).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<Small>(&bytes), value);
        assert!(buffer.buffer().read(0, 8).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut buffer =
            UploadBuffer::<Headless, Small>::new(&device(), 2, BufferUsage::Constant).unwrap();
        assert!(matches!(
            buffer.copy_data(2, &Small::zeroed()),
            Err(RendererError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        assert!(UploadBuffer::<Headless, Small>::new(&device(), 0, BufferUsage::Constant).is_err());
    }
}
