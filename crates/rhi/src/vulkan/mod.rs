//! Vulkan 1.3 backend.
//!
//! The explicit object model maps onto Vulkan as follows:
//! - fences are timeline semaphores
//! - a command allocator is a command pool holding one primary buffer
//! - a shader-visible descriptor heap is one descriptor set with a single
//!   arrayed binding; render-target and depth-stencil heaps store image views
//! - a root signature is a pipeline layout with one set per parameter
//! - render passes are dynamic rendering scopes opened at the first draw

mod adapter;
mod command;
mod convert;
mod descriptor;
mod device;
mod instance;
mod pipeline;
mod queue;
mod resources;
mod swapchain;
mod sync;

use std::sync::Arc;

use tracing::info;

use gpuframe_platform::Window;

use crate::backend::{Backend, WindowHandle};
use crate::error::RhiResult;
use crate::types::{DeviceDesc, Extent2D};

pub use adapter::{PhysicalDeviceInfo, QueueFamilyIndices, select_physical_device};
pub use command::{VulkanCommandAllocator, VulkanCommandList};
pub use descriptor::VulkanDescriptorHeap;
pub use device::VulkanDevice;
pub use instance::Instance;
pub use pipeline::{VulkanPipelineState, VulkanRootSignature, VulkanShader};
pub use queue::VulkanQueue;
pub use resources::{VulkanBuffer, VulkanTexture};
pub use swapchain::{SwapchainSupportDetails, VulkanSwapChain};
pub use sync::VulkanFence;

/// Marker type selecting the Vulkan implementation.
#[derive(Debug)]
pub enum Vulkan {}

impl Backend for Vulkan {
    const NAME: &'static str = "vulkan";

    type Window = Window;
    type Device = VulkanDevice;
    type Queue = VulkanQueue;
    type CommandAllocator = VulkanCommandAllocator;
    type CommandList = VulkanCommandList;
    type Fence = VulkanFence;
    type DescriptorHeap = VulkanDescriptorHeap;
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type SwapChain = VulkanSwapChain;
    type Shader = VulkanShader;
    type RootSignature = VulkanRootSignature;
    type PipelineState = VulkanPipelineState;

    fn create_device(window: &Window, desc: &DeviceDesc) -> RhiResult<Arc<VulkanDevice>> {
        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(&desc.application_name, desc.debug_layer, &surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = VulkanDevice::new(instance, surface, physical)?;
        info!("Vulkan backend ready");
        Ok(device)
    }
}

impl WindowHandle for Window {
    fn inner_extent(&self) -> Extent2D {
        let (width, height) = self.inner_size();
        Extent2D::new(width, height)
    }
}
