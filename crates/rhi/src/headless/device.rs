use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::command::{ExecutedList, HeadlessCommandAllocator, HeadlessCommandList};
use super::descriptor::{HeadlessDescriptor, HeadlessDescriptorHeap};
use super::resources::{
    HeadlessBuffer, HeadlessPipelineState, HeadlessRootSignature, HeadlessShader, HeadlessTexture,
};
use super::swapchain::HeadlessSwapChain;
use super::timeline::{HeadlessFence, HeadlessQueue};
use super::{Headless, HeadlessWindow};
use crate::backend::{Buffer as _, Device, SwapChain as _, Texture as _};
use crate::error::{RhiError, RhiResult};
use crate::shader::ParsedShader;
use crate::types::{
    AdapterInfo, AdapterKind, AttachmentView, BufferDesc, DescriptorHeapDesc, DescriptorHeapKind,
    DeviceDesc, PipelineStateDesc, RootParameter, RootSignatureDesc, SamplerDesc, ShaderSource,
    ShaderStage, SwapChainDesc, TextureDesc, TextureUsage,
};

/// State shared between the device, its objects and the GPU worker.
#[derive(Debug)]
pub(crate) struct DeviceShared {
    lost: AtomicBool,
    next_id: AtomicU64,
    next_heap_id: AtomicU32,
    latency: Mutex<Duration>,
    executed: Mutex<Vec<ExecutedList>>,
    pending: Mutex<u64>,
    drained: Condvar,
}

impl DeviceShared {
    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_alive(&self) -> RhiResult<()> {
        if self.is_lost() {
            return Err(RhiError::DeviceLost);
        }
        Ok(())
    }

    /// Ids start at 1 so that 0 never names a live object.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_heap_id(&self) -> u32 {
        self.next_heap_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    pub(crate) fn record_executed(&self, list: ExecutedList) {
        self.executed.lock().push(list);
    }

    pub(crate) fn begin_submission(&self) {
        *self.pending.lock() += 1;
    }

    pub(crate) fn finish_submission(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until every queue has drained its submissions.
    fn wait_drained(&self) -> RhiResult<()> {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.ensure_alive()?;
            self.drained
                .wait_for(&mut pending, Duration::from_millis(5));
        }
        self.ensure_alive()
    }
}

/// In-memory device.
#[derive(Debug)]
pub struct HeadlessDevice {
    shared: Arc<DeviceShared>,
    adapter: AdapterInfo,
}

impl HeadlessDevice {
    pub(crate) fn new(desc: &DeviceDesc) -> Arc<Self> {
        let adapter = AdapterInfo {
            name: "gpuframe headless adapter".to_string(),
            vendor_id: 0,
            device_id: 0,
            kind: AdapterKind::Software,
        };
        info!(
            "Headless device created for '{}' (debug layer {})",
            desc.application_name,
            if desc.debug_layer { "requested" } else { "off" }
        );
        Arc::new(Self {
            shared: Arc::new(DeviceShared {
                lost: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                next_heap_id: AtomicU32::new(1),
                latency: Mutex::new(Duration::ZERO),
                executed: Mutex::new(Vec::new()),
                pending: Mutex::new(0),
                drained: Condvar::new(),
            }),
            adapter,
        })
    }

    /// Time the GPU worker spends on each submitted command list.
    pub fn set_gpu_latency(&self, latency: Duration) {
        *self.shared.latency.lock() = latency;
    }

    /// Marks the device as removed. Pending work never completes and every
    /// subsequent call on any object of this device fails with `DeviceLost`.
    pub fn simulate_device_loss(&self) {
        warn!("Simulating device loss");
        self.shared.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.shared.is_lost()
    }

    /// Command lists the GPU worker has finished, in execution order.
    pub fn executed_lists(&self) -> Vec<ExecutedList> {
        self.shared.executed.lock().clone()
    }

    /// Drains the executed list log.
    pub fn take_executed_lists(&self) -> Vec<ExecutedList> {
        std::mem::take(&mut *self.shared.executed.lock())
    }

    fn check_slot(heap: &HeadlessDescriptorHeap, kind: DescriptorHeapKind, slot: u32) -> RhiResult<()> {
        let desc = heap.desc_ref();
        if desc.kind != kind {
            return Err(RhiError::InvalidArgument(format!(
                "cannot write a {} descriptor into a {} heap",
                kind, desc.kind
            )));
        }
        if slot >= desc.capacity {
            return Err(RhiError::InvalidArgument(format!(
                "slot {} out of range for {} heap of capacity {}",
                slot, desc.kind, desc.capacity
            )));
        }
        Ok(())
    }
}

impl Device<Headless> for HeadlessDevice {
    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn descriptor_increment_size(&self, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::RenderTarget | DescriptorHeapKind::DepthStencil => 8,
            DescriptorHeapKind::ConstantBuffer
            | DescriptorHeapKind::ShaderResource
            | DescriptorHeapKind::Sampler => 32,
        }
    }

    fn create_command_queue(self: &Arc<Self>) -> RhiResult<HeadlessQueue> {
        self.shared.ensure_alive()?;
        HeadlessQueue::new(self.shared.clone())
    }

    fn create_command_allocator(self: &Arc<Self>) -> RhiResult<HeadlessCommandAllocator> {
        self.shared.ensure_alive()?;
        Ok(HeadlessCommandAllocator::new(self.shared.next_id()))
    }

    fn create_command_list(
        self: &Arc<Self>,
        allocator: &HeadlessCommandAllocator,
    ) -> RhiResult<HeadlessCommandList> {
        self.shared.ensure_alive()?;
        Ok(HeadlessCommandList::new(self.shared.next_id(), allocator))
    }

    fn create_fence(self: &Arc<Self>, initial_value: u64) -> RhiResult<HeadlessFence> {
        self.shared.ensure_alive()?;
        Ok(HeadlessFence::new(self.shared.clone(), initial_value))
    }

    fn create_descriptor_heap(
        self: &Arc<Self>,
        desc: &DescriptorHeapDesc,
    ) -> RhiResult<HeadlessDescriptorHeap> {
        self.shared.ensure_alive()?;
        if desc.capacity == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "{} heap capacity must be non-zero",
                desc.kind
            )));
        }
        if desc.shader_visible && !desc.kind.can_be_shader_visible() {
            return Err(RhiError::InvalidArgument(format!(
                "{} heaps cannot be shader visible",
                desc.kind
            )));
        }
        let heap = HeadlessDescriptorHeap::new(
            self.shared.next_heap_id(),
            *desc,
            self.descriptor_increment_size(desc.kind),
        );
        debug!("Created {} heap with {} slot(s)", desc.kind, desc.capacity);
        Ok(heap)
    }

    fn create_buffer(self: &Arc<Self>, desc: &BufferDesc) -> RhiResult<HeadlessBuffer> {
        self.shared.ensure_alive()?;
        if desc.size == 0 {
            return Err(RhiError::InvalidArgument(
                "Buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(HeadlessBuffer::new(Arc::clone(&self.shared), *desc))
    }

    fn create_texture(self: &Arc<Self>, desc: &TextureDesc) -> RhiResult<HeadlessTexture> {
        self.shared.ensure_alive()?;
        if desc.extent.is_empty() || desc.mip_levels == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "invalid texture extent {} with {} mip level(s)",
                desc.extent, desc.mip_levels
            )));
        }
        if (desc.usage == TextureUsage::DepthStencil) != desc.format.is_depth() {
            return Err(RhiError::InvalidArgument(format!(
                "format {:?} does not match texture usage {:?}",
                desc.format, desc.usage
            )));
        }
        Ok(HeadlessTexture::new(self.shared.next_id(), *desc))
    }

    fn create_swap_chain(
        self: &Arc<Self>,
        _queue: &HeadlessQueue,
        window: &HeadlessWindow,
        desc: &SwapChainDesc,
    ) -> RhiResult<HeadlessSwapChain> {
        self.shared.ensure_alive()?;
        HeadlessSwapChain::new(self.shared.clone(), window.clone(), *desc)
    }

    fn compile_shader(
        self: &Arc<Self>,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> RhiResult<HeadlessShader> {
        let parsed = ParsedShader::parse(stage, source)?;
        Ok(HeadlessShader::new(self.shared.next_id(), parsed))
    }

    fn create_root_signature(
        self: &Arc<Self>,
        desc: &RootSignatureDesc,
    ) -> RhiResult<HeadlessRootSignature> {
        for parameter in &desc.parameters {
            match *parameter {
                RootParameter::ConstantBuffer { heap_capacity: 0 }
                | RootParameter::DescriptorTable { count: 0, .. } => {
                    return Err(RhiError::PipelineError(
                        "root parameters must cover at least one descriptor".to_string(),
                    ));
                }
                RootParameter::DescriptorTable { kind, .. } if !kind.can_be_shader_visible() => {
                    return Err(RhiError::PipelineError(format!(
                        "a descriptor table cannot reference a {} heap",
                        kind
                    )));
                }
                _ => {}
            }
        }
        Ok(HeadlessRootSignature::new(self.shared.next_id(), desc.clone()))
    }

    fn create_pipeline_state(
        self: &Arc<Self>,
        root_signature: &HeadlessRootSignature,
        vertex_shader: &HeadlessShader,
        pixel_shader: &HeadlessShader,
        desc: &PipelineStateDesc,
    ) -> RhiResult<HeadlessPipelineState> {
        if vertex_shader.stage() != ShaderStage::Vertex || pixel_shader.stage() != ShaderStage::Pixel {
            return Err(RhiError::PipelineError(
                "pipeline needs a vertex and a pixel shader".to_string(),
            ));
        }
        if !desc.depth_format.is_depth() || desc.render_target_format.is_depth() {
            return Err(RhiError::PipelineError(
                "render target and depth formats are swapped".to_string(),
            ));
        }
        Ok(HeadlessPipelineState::new(
            self.shared.next_id(),
            root_signature.id(),
            desc.clone(),
        ))
    }

    fn create_constant_buffer_view(
        &self,
        heap: &mut HeadlessDescriptorHeap,
        slot: u32,
        buffer: &HeadlessBuffer,
        offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        Self::check_slot(heap, DescriptorHeapKind::ConstantBuffer, slot)?;
        if offset + size > buffer.desc().size {
            return Err(RhiError::InvalidArgument(format!(
                "constant buffer view {}..{} exceeds buffer size {}",
                offset,
                offset + size,
                buffer.desc().size
            )));
        }
        heap.write_constant_buffer(slot, buffer, offset, size);
        Ok(())
    }

    fn create_shader_resource_view(
        &self,
        heap: &mut HeadlessDescriptorHeap,
        slot: u32,
        texture: &HeadlessTexture,
    ) -> RhiResult<()> {
        Self::check_slot(heap, DescriptorHeapKind::ShaderResource, slot)?;
        if texture.desc().usage != TextureUsage::Sampled {
            return Err(RhiError::InvalidArgument(
                "shader resource views need a sampled texture".to_string(),
            ));
        }
        heap.write(
            slot,
            HeadlessDescriptor::ShaderResource {
                texture: texture.id(),
            },
        );
        Ok(())
    }

    fn create_sampler(
        &self,
        heap: &mut HeadlessDescriptorHeap,
        slot: u32,
        desc: &SamplerDesc,
    ) -> RhiResult<()> {
        Self::check_slot(heap, DescriptorHeapKind::Sampler, slot)?;
        heap.write(slot, HeadlessDescriptor::Sampler(*desc));
        Ok(())
    }

    fn create_depth_stencil_view(
        &self,
        heap: &mut HeadlessDescriptorHeap,
        slot: u32,
        texture: &HeadlessTexture,
    ) -> RhiResult<()> {
        Self::check_slot(heap, DescriptorHeapKind::DepthStencil, slot)?;
        if texture.desc().usage != TextureUsage::DepthStencil {
            return Err(RhiError::InvalidArgument(
                "depth-stencil views need a depth texture".to_string(),
            ));
        }
        let view = AttachmentView {
            handle: heap.slot_handle(slot),
            view: self.shared.next_id(),
            image: texture.image(),
            extent: texture.desc().extent,
        };
        heap.write(slot, HeadlessDescriptor::DepthStencil(view));
        Ok(())
    }

    fn create_render_target_view(
        &self,
        heap: &mut HeadlessDescriptorHeap,
        slot: u32,
        swap_chain: &HeadlessSwapChain,
        buffer_index: u32,
    ) -> RhiResult<()> {
        Self::check_slot(heap, DescriptorHeapKind::RenderTarget, slot)?;
        let view = AttachmentView {
            handle: heap.slot_handle(slot),
            view: self.shared.next_id(),
            image: swap_chain.back_buffer(buffer_index)?,
            extent: swap_chain.desc().extent,
        };
        heap.write(slot, HeadlessDescriptor::RenderTarget(view));
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.shared.wait_drained()
    }
}
