//! Vulkan logical device, memory allocator and the [`Device`] implementation.

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use gpuframe_platform::{Surface, Window};

use super::Vulkan;
use super::adapter::{PhysicalDeviceInfo, QueueFamilyIndices};
use super::command::{VulkanCommandAllocator, VulkanCommandList};
use super::descriptor::VulkanDescriptorHeap;
use super::instance::Instance;
use super::pipeline::{VulkanPipelineState, VulkanRootSignature, VulkanShader};
use super::queue::VulkanQueue;
use super::resources::{VulkanBuffer, VulkanTexture};
use super::swapchain::VulkanSwapChain;
use super::sync::VulkanFence;
use crate::backend::Device;
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AdapterInfo, BufferDesc, DescriptorHeapDesc, DescriptorHeapKind, PipelineStateDesc,
    RootSignatureDesc, SamplerDesc, ShaderSource, ShaderStage, SwapChainDesc, TextureDesc,
};

/// Required device extensions. Everything else used is core in Vulkan 1.3.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device.
///
/// Owns the instance and the presentation surface so that every object
/// created from the device can keep it alive through an `Arc`. Destruction
/// runs device, then surface, then instance.
pub struct VulkanDevice {
    allocator: ManuallyDrop<Mutex<Allocator>>,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    physical: PhysicalDeviceInfo,
    adapter: AdapterInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    next_heap_id: AtomicU32,
    surface: Surface,
    instance: Instance,
}

impl VulkanDevice {
    /// Creates the logical device on `physical`.
    ///
    /// # Errors
    ///
    /// Returns an error if device or allocator creation fails.
    pub fn new(
        instance: Instance,
        surface: Surface,
        physical: PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let families = physical.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .descriptor_indexing(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_update_unused_while_pending(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        // SAFETY: the physical device belongs to `instance`, and every pointer in
        // create_info outlives the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(physical.device, &create_info, None)?
        };

        // SAFETY: both families were requested with one queue each.
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(graphics_family, 0),
                device.get_device_queue(present_family, 0),
            )
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing else has been created from the device.
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);
        let adapter = physical.adapter_info();

        info!(
            "Logical device created on '{}' (graphics family {}, present family {})",
            adapter.name, graphics_family, present_family
        );

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            swapchain_loader,
            physical,
            adapter,
            graphics_queue,
            present_queue,
            next_heap_id: AtomicU32::new(1),
            surface,
            instance,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical.queue_families
    }

    #[inline]
    pub(crate) fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub(crate) fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// GPU memory allocator shared by buffers and textures.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    #[inline]
    pub(crate) fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub(crate) fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Device<Vulkan> for VulkanDevice {
    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Heap handles address the host-side write record of each descriptor.
    fn descriptor_increment_size(&self, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::RenderTarget | DescriptorHeapKind::DepthStencil => {
                std::mem::size_of::<vk::ImageView>() as u32
            }
            DescriptorHeapKind::ConstantBuffer => {
                std::mem::size_of::<vk::DescriptorBufferInfo>() as u32
            }
            DescriptorHeapKind::ShaderResource | DescriptorHeapKind::Sampler => {
                std::mem::size_of::<vk::DescriptorImageInfo>() as u32
            }
        }
    }

    fn create_command_queue(self: &Arc<Self>) -> RhiResult<VulkanQueue> {
        Ok(VulkanQueue::new(self.clone()))
    }

    fn create_command_allocator(self: &Arc<Self>) -> RhiResult<VulkanCommandAllocator> {
        VulkanCommandAllocator::new(self.clone())
    }

    fn create_command_list(
        self: &Arc<Self>,
        allocator: &VulkanCommandAllocator,
    ) -> RhiResult<VulkanCommandList> {
        Ok(VulkanCommandList::new(self.clone(), allocator))
    }

    fn create_fence(self: &Arc<Self>, initial_value: u64) -> RhiResult<VulkanFence> {
        VulkanFence::new(self.clone(), initial_value)
    }

    fn create_descriptor_heap(
        self: &Arc<Self>,
        desc: &DescriptorHeapDesc,
    ) -> RhiResult<VulkanDescriptorHeap> {
        if desc.capacity == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "{} heap needs at least one slot",
                desc.kind
            )));
        }
        if desc.shader_visible && !desc.kind.can_be_shader_visible() {
            return Err(RhiError::InvalidArgument(format!(
                "{} heaps cannot be shader visible",
                desc.kind
            )));
        }
        let id = self.next_heap_id.fetch_add(1, Ordering::Relaxed);
        let increment = self.descriptor_increment_size(desc.kind);
        VulkanDescriptorHeap::new(self.clone(), id, *desc, increment)
    }

    fn create_buffer(self: &Arc<Self>, desc: &BufferDesc) -> RhiResult<VulkanBuffer> {
        VulkanBuffer::new(self.clone(), *desc)
    }

    fn create_texture(self: &Arc<Self>, desc: &TextureDesc) -> RhiResult<VulkanTexture> {
        VulkanTexture::new(self.clone(), *desc)
    }

    fn create_swap_chain(
        self: &Arc<Self>,
        _queue: &VulkanQueue,
        window: &Window,
        desc: &SwapChainDesc,
    ) -> RhiResult<VulkanSwapChain> {
        VulkanSwapChain::new(self.clone(), window.clone(), *desc)
    }

    fn compile_shader(
        self: &Arc<Self>,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> RhiResult<VulkanShader> {
        VulkanShader::new(self.clone(), stage, source)
    }

    fn create_root_signature(
        self: &Arc<Self>,
        desc: &RootSignatureDesc,
    ) -> RhiResult<VulkanRootSignature> {
        VulkanRootSignature::new(self.clone(), desc)
    }

    fn create_pipeline_state(
        self: &Arc<Self>,
        root_signature: &VulkanRootSignature,
        vertex_shader: &VulkanShader,
        pixel_shader: &VulkanShader,
        desc: &PipelineStateDesc,
    ) -> RhiResult<VulkanPipelineState> {
        VulkanPipelineState::new(self.clone(), root_signature, vertex_shader, pixel_shader, desc)
    }

    fn create_constant_buffer_view(
        &self,
        heap: &mut VulkanDescriptorHeap,
        slot: u32,
        buffer: &VulkanBuffer,
        offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        heap.write_constant_buffer(slot, buffer, offset, size)
    }

    fn create_shader_resource_view(
        &self,
        heap: &mut VulkanDescriptorHeap,
        slot: u32,
        texture: &VulkanTexture,
    ) -> RhiResult<()> {
        heap.write_shader_resource(slot, texture)
    }

    fn create_sampler(
        &self,
        heap: &mut VulkanDescriptorHeap,
        slot: u32,
        desc: &SamplerDesc,
    ) -> RhiResult<()> {
        heap.write_sampler(slot, desc)
    }

    fn create_depth_stencil_view(
        &self,
        heap: &mut VulkanDescriptorHeap,
        slot: u32,
        texture: &VulkanTexture,
    ) -> RhiResult<()> {
        heap.write_depth_stencil(slot, texture)
    }

    fn create_render_target_view(
        &self,
        heap: &mut VulkanDescriptorHeap,
        slot: u32,
        swap_chain: &VulkanSwapChain,
        buffer_index: u32,
    ) -> RhiResult<()> {
        heap.write_render_target(slot, swap_chain, buffer_index)
    }

    fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: callers never submit while waiting for idle.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        // SAFETY: every child object holds an Arc of the device, so none is left.
        // The allocator frees its memory blocks through the device and must go first.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_swapchain_extension_is_required() {
        assert_eq!(DEVICE_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VulkanDevice>();
    }
}
