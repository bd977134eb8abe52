//! The render hardware interface as a family of traits.
//!
//! A [`Backend`] names one concrete type per GPU object. The object model is
//! the explicit one: a device creates everything, command lists are recorded
//! against an allocator and submitted to a queue, a monotonically increasing
//! fence marks points on the GPU timeline, and descriptors live in fixed
//! capacity heaps addressed by slot.
//!
//! Objects that must outlive their creator's borrow hold an `Arc` of the
//! device, which is why creation methods take `self: &Arc<Self>`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RhiResult;
use crate::types::{
    AdapterInfo, AttachmentView, BufferDesc, DescriptorHandle, DescriptorHeapDesc,
    DescriptorHeapKind, DeviceDesc, DisplayMode, Extent2D, ImageHandle, IndexFormat,
    PipelineStateDesc, PresentStatus, ResourceState, RootSignatureDesc, SamplerDesc,
    ScissorRect, ShaderSource, ShaderStage, SwapChainDesc, TextureDesc, Viewport,
};

/// A type family binding every RHI object to one implementation.
pub trait Backend: Sized + Send + Sync + 'static {
    /// Human-readable backend name for logs.
    const NAME: &'static str;

    type Window: WindowHandle;
    type Device: Device<Self>;
    type Queue: CommandQueue<Self>;
    type CommandAllocator: CommandAllocator;
    type CommandList: CommandList<Self>;
    type Fence: Fence;
    type DescriptorHeap: DescriptorHeap;
    type Buffer: Buffer;
    type Texture: Texture;
    type SwapChain: SwapChain<Self>;
    type Shader: Send + Sync;
    type RootSignature: Send + Sync;
    type PipelineState: Send + Sync;

    /// Creates a device on the best adapter able to present to `window`.
    fn create_device(window: &Self::Window, desc: &DeviceDesc) -> RhiResult<Arc<Self::Device>>;
}

/// A window the renderer can present to. Owned by the caller.
pub trait WindowHandle: Clone + Send + Sync + 'static {
    /// Current client area in physical pixels.
    fn inner_extent(&self) -> Extent2D;
}

pub trait Device<B: Backend>: Send + Sync + 'static {
    fn adapter_info(&self) -> &AdapterInfo;

    /// Distance in bytes between two consecutive handles of a heap kind.
    fn descriptor_increment_size(&self, kind: DescriptorHeapKind) -> u32;

    fn create_command_queue(self: &Arc<Self>) -> RhiResult<B::Queue>;

    fn create_command_allocator(self: &Arc<Self>) -> RhiResult<B::CommandAllocator>;

    /// Creates a command list in the closed state.
    fn create_command_list(
        self: &Arc<Self>,
        allocator: &B::CommandAllocator,
    ) -> RhiResult<B::CommandList>;

    fn create_fence(self: &Arc<Self>, initial_value: u64) -> RhiResult<B::Fence>;

    fn create_descriptor_heap(
        self: &Arc<Self>,
        desc: &DescriptorHeapDesc,
    ) -> RhiResult<B::DescriptorHeap>;

    fn create_buffer(self: &Arc<Self>, desc: &BufferDesc) -> RhiResult<B::Buffer>;

    fn create_texture(self: &Arc<Self>, desc: &TextureDesc) -> RhiResult<B::Texture>;

    fn create_swap_chain(
        self: &Arc<Self>,
        queue: &B::Queue,
        window: &B::Window,
        desc: &SwapChainDesc,
    ) -> RhiResult<B::SwapChain>;

    fn compile_shader(
        self: &Arc<Self>,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> RhiResult<B::Shader>;

    fn create_root_signature(
        self: &Arc<Self>,
        desc: &RootSignatureDesc,
    ) -> RhiResult<B::RootSignature>;

    fn create_pipeline_state(
        self: &Arc<Self>,
        root_signature: &B::RootSignature,
        vertex_shader: &B::Shader,
        pixel_shader: &B::Shader,
        desc: &PipelineStateDesc,
    ) -> RhiResult<B::PipelineState>;

    /// Writes a view of `size` bytes of `buffer` starting at `offset`.
    fn create_constant_buffer_view(
        &self,
        heap: &mut B::DescriptorHeap,
        slot: u32,
        buffer: &B::Buffer,
        offset: u64,
        size: u64,
    ) -> RhiResult<()>;

    fn create_shader_resource_view(
        &self,
        heap: &mut B::DescriptorHeap,
        slot: u32,
        texture: &B::Texture,
    ) -> RhiResult<()>;

    fn create_sampler(
        &self,
        heap: &mut B::DescriptorHeap,
        slot: u32,
        desc: &SamplerDesc,
    ) -> RhiResult<()>;

    fn create_depth_stencil_view(
        &self,
        heap: &mut B::DescriptorHeap,
        slot: u32,
        texture: &B::Texture,
    ) -> RhiResult<()>;

    /// Writes a view of swap chain buffer `buffer_index`.
    fn create_render_target_view(
        &self,
        heap: &mut B::DescriptorHeap,
        slot: u32,
        swap_chain: &B::SwapChain,
        buffer_index: u32,
    ) -> RhiResult<()>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;
}

pub trait CommandQueue<B: Backend>: Send {
    /// Submits closed command lists for execution in order.
    fn execute_command_lists(&self, lists: &[&B::CommandList]) -> RhiResult<()>;

    /// Sets `fence` to `value` once all previously submitted work completes.
    fn signal(&self, fence: &B::Fence, value: u64) -> RhiResult<()>;
}

pub trait CommandAllocator: Send {
    /// Reclaims command memory. All lists recorded against it must have completed.
    fn reset(&mut self) -> RhiResult<()>;
}

/// Recording interface. Recording calls are only valid between `reset` and `close`.
pub trait CommandList<B: Backend>: Send {
    fn is_closed(&self) -> bool;

    fn reset(&mut self, allocator: &B::CommandAllocator) -> RhiResult<()>;

    fn close(&mut self) -> RhiResult<()>;

    fn set_viewports(&mut self, viewports: &[Viewport]);

    fn set_scissor_rects(&mut self, rects: &[ScissorRect]);

    fn transition_barrier(&mut self, image: ImageHandle, before: ResourceState, after: ResourceState);

    fn clear_render_target_view(&mut self, view: &AttachmentView, color: [f32; 4]);

    fn clear_depth_stencil_view(&mut self, view: &AttachmentView, depth: f32, stencil: u8);

    fn set_render_targets(
        &mut self,
        render_targets: &[AttachmentView],
        depth_stencil: Option<&AttachmentView>,
    );

    fn set_descriptor_heaps(&mut self, heaps: &[&B::DescriptorHeap]);

    fn set_pipeline_state(&mut self, pipeline_state: &B::PipelineState);

    fn set_graphics_root_signature(&mut self, root_signature: &B::RootSignature);

    /// Binds slot `slot` of a constant-buffer heap at `byte_offset` to root parameter `parameter`.
    fn set_graphics_root_constant_buffer(
        &mut self,
        parameter: u32,
        heap: &B::DescriptorHeap,
        slot: u32,
        byte_offset: u32,
    );

    fn set_graphics_root_descriptor_table(&mut self, parameter: u32, heap: &B::DescriptorHeap);

    fn set_vertex_buffer(&mut self, buffer: &B::Buffer, stride: u32);

    fn set_index_buffer(&mut self, buffer: &B::Buffer, format: IndexFormat);

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );
}

/// A GPU timeline point. Values only ever increase.
pub trait Fence: Send + Sync {
    fn completed_value(&self) -> RhiResult<u64>;

    /// Blocks until the completed value reaches `value`.
    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()>;
}

pub trait DescriptorHeap: Send {
    fn desc(&self) -> DescriptorHeapDesc;

    /// Handle of slot 0.
    fn start_handle(&self) -> DescriptorHandle;

    /// Handle of `slot`, computed from the cached increment size.
    fn handle(&self, slot: u32) -> DescriptorHandle;

    /// Whether a descriptor has been written into `slot`.
    fn is_occupied(&self, slot: u32) -> bool;

    /// The view stored in a render-target or depth-stencil heap slot.
    fn attachment(&self, slot: u32) -> Option<AttachmentView>;

    /// Releases every descriptor, leaving all slots empty.
    fn reset(&mut self);
}

/// A host-visible, persistently mapped buffer.
pub trait Buffer: Send + Sync {
    fn desc(&self) -> BufferDesc;

    fn write(&mut self, offset: u64, data: &[u8]) -> RhiResult<()>;
}

pub trait Texture: Send + Sync {
    fn desc(&self) -> TextureDesc;

    fn image(&self) -> ImageHandle;
}

pub trait SwapChain<B: Backend>: Send {
    fn desc(&self) -> SwapChainDesc;

    /// The single buffer currently rendered to; changes only on present.
    fn current_back_buffer_index(&self) -> u32;

    fn back_buffer(&self, index: u32) -> RhiResult<ImageHandle>;

    /// Presents the current buffer. `sync_interval` 0 disables vsync.
    fn present(&mut self, queue: &B::Queue, sync_interval: u32) -> RhiResult<PresentStatus>;

    /// Recreates every buffer. Views of the old buffers must be released first.
    fn resize_buffers(&mut self, buffer_count: u32, extent: Extent2D) -> RhiResult<()>;

    /// Enters exclusive fullscreen in `mode`, or returns to windowed mode for `None`.
    fn set_fullscreen_state(
        &mut self,
        window: &B::Window,
        mode: Option<&DisplayMode>,
    ) -> RhiResult<()>;

    fn is_fullscreen(&self) -> bool;

    /// Display modes of the output hosting `window`, queried now.
    fn display_modes(&self, window: &B::Window) -> RhiResult<Vec<DisplayMode>>;
}
