//! Buffers and textures backed by gpu-allocator.
//!
//! Buffers live in host-visible memory and stay mapped for their lifetime,
//! so `write` is a plain memory copy. Textures live in device-local memory.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use super::convert;
use super::device::VulkanDevice;
use crate::backend::{Buffer, Texture};
use crate::error::{RhiError, RhiResult};
use crate::types::{BufferDesc, Format, ImageHandle, TextureDesc};

pub struct VulkanBuffer {
    device: Arc<VulkanDevice>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    desc: BufferDesc,
}

impl VulkanBuffer {
    pub(crate) fn new(device: Arc<VulkanDevice>, desc: BufferDesc) -> RhiResult<Self> {
        if desc.size == 0 {
            return Err(RhiError::InvalidArgument(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(convert::buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: valid device and create info.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        // SAFETY: the buffer was just created from this device.
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: desc.usage.name(),
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: the buffer has no memory bound and is unused.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let mut this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            desc,
        };
        if let Some(allocation) = this.allocation.as_ref() {
            // SAFETY: the allocation satisfies the buffer's requirements.
            unsafe {
                this.device.handle().bind_buffer_memory(
                    this.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?
            };
        }
        if let Some(allocation) = this.allocation.as_mut()
            && let Some(bytes) = allocation.mapped_slice_mut()
        {
            bytes.fill(0);
        }

        debug!("Created {} buffer: {} bytes", desc.usage.name(), desc.size);
        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl Buffer for VulkanBuffer {
    fn desc(&self) -> BufferDesc {
        self.desc
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()> {
        let end = offset.saturating_add(data.len() as u64);
        if end > self.desc.size {
            return Err(RhiError::InvalidArgument(format!(
                "write {}..{} exceeds buffer size {}",
                offset, end, self.desc.size
            )));
        }

        let bytes = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| RhiError::Internal("buffer memory is not mapped".to_string()))?;
        bytes[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free buffer allocation: {:?}", e);
        }
        // SAFETY: owners flush the queue before dropping buffers it reads.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}

pub struct VulkanTexture {
    device: Arc<VulkanDevice>,
    image: vk::Image,
    allocation: Option<Allocation>,
    desc: TextureDesc,
}

impl VulkanTexture {
    pub(crate) fn new(device: Arc<VulkanDevice>, desc: TextureDesc) -> RhiResult<Self> {
        if desc.extent.is_empty() {
            return Err(RhiError::InvalidArgument(format!(
                "cannot create a {} texture",
                desc.extent
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(convert::format(desc.format))
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert::texture_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: valid device and create info.
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        // SAFETY: the image was just created from this device.
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: the image has no memory bound and is unused.
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let this = Self {
            device,
            image,
            allocation: Some(allocation),
            desc,
        };
        if let Some(allocation) = this.allocation.as_ref() {
            // SAFETY: the allocation satisfies the image's requirements.
            unsafe {
                this.device.handle().bind_image_memory(
                    this.image,
                    allocation.memory(),
                    allocation.offset(),
                )?
            };
        }

        debug!(
            "Created {:?} texture {} ({} mip(s))",
            desc.format, desc.extent, desc.mip_levels
        );
        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }
}

impl Texture for VulkanTexture {
    fn desc(&self) -> TextureDesc {
        self.desc
    }

    fn image(&self) -> ImageHandle {
        ImageHandle {
            raw: self.image.as_raw(),
            format: self.desc.format,
            mip_levels: self.desc.mip_levels,
        }
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        // SAFETY: owners flush the queue before dropping textures it reads.
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free texture allocation: {:?}", e);
        }
    }
}

/// Creates a 2D view covering every mip of `image`.
pub(crate) fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: Format,
    mip_levels: u32,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(convert::format(format))
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: convert::aspect_mask(format),
            base_mip_level: 0,
            level_count: mip_levels.max(1),
            base_array_layer: 0,
            layer_count: 1,
        });

    // SAFETY: `image` is a live image of `device` created with a compatible format.
    let view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(view)
}
