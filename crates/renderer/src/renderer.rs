//! Main renderer orchestration.
//!
//! [`Renderer`] owns every GPU object of the frame pipeline and drives the
//! per-frame protocol:
//!
//! ```text
//! new_frame -> (record through command_list) -> update_pass_constants
//!           -> execute_command_list -> end_frame
//! ```
//!
//! Each public operation is checked against the [`FrameState`] machine
//! before it touches the GPU. A call made out of order returns
//! [`RendererError::InvalidState`] and changes nothing. A lost device moves
//! the renderer to [`FrameState::Lost`] for good.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use gpuframe_core::RendererConfig;
use gpuframe_rhi::{
    AdapterInfo, AttachmentView, Backend, BufferUsage, CommandList as _, CommandQueue as _, CullMode,
    DescriptorHeap as _, DescriptorHeapDesc, DescriptorHeapKind, Device as _, DeviceDesc,
    DisplayMode, Extent2D, Fence as _, Format, PipelineStateDesc, PresentStatus, ResourceState,
    RhiError, RhiResult, RootParameter, RootSignatureDesc, SamplerDesc, ScissorRect,
    ShaderSource, ShaderStage, SwapChainDesc, Vertex, Viewport, WindowHandle as _,
};

use crate::depth_buffer::{DEPTH_CLEAR_VALUE, DepthBuffer};
use crate::error::{InitStage, RendererError, RendererResult};
use crate::frame::FrameManager;
use crate::frame_state::{FrameState, Operation, Pass};
use crate::pass_constants::PassConstants;
use crate::registry::{Registry, SamplerRegistry, TextureRegistry};
use crate::swap_chain::{SwapChain, best_display_mode};
use crate::upload_buffer::UploadBuffer;

/// Root parameter of the per-pass constant buffer.
pub const PASS_CONSTANTS_PARAMETER: u32 = 0;
/// Root parameter of the texture descriptor table.
pub const TEXTURE_TABLE_PARAMETER: u32 = 1;
/// Root parameter of the sampler descriptor table.
pub const SAMPLER_TABLE_PARAMETER: u32 = 2;

/// Back buffer format requested from the swap chain.
pub const BACK_BUFFER_FORMAT: Format = Format::Bgra8Unorm;

const DEFAULT_SHADER: &str = include_str!("shaders/default.wgsl");

/// Vertex and pixel shader sources compiled at init.
#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub vertex: ShaderSource,
    pub pixel: ShaderSource,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: ShaderSource::wgsl(DEFAULT_SHADER, "vs_main"),
            pixel: ShaderSource::wgsl(DEFAULT_SHADER, "ps_main"),
        }
    }
}

/// What leaving fullscreen restores.
#[derive(Clone, Copy, Debug)]
struct WindowedState {
    extent: Extent2D,
    back_buffer_count: u32,
}

/// Owner of the device and everything created from it.
///
/// # Resource Destruction Order
///
/// `Drop` waits for the GPU and clears the registries. The fields are then
/// released in declaration order: command recording objects first, then
/// pipeline objects, heaps and buffers, the swap chain, the fence and the
/// queue, and the device last.
pub struct Renderer<B: Backend> {
    command_list: B::CommandList,
    frames: FrameManager<B>,

    pipeline_state: B::PipelineState,
    root_signature: B::RootSignature,

    textures: TextureRegistry<B>,
    samplers: SamplerRegistry,
    srv_heap: B::DescriptorHeap,
    sampler_heap: B::DescriptorHeap,
    cbv_heap: B::DescriptorHeap,
    pass_constants: UploadBuffer<B, PassConstants>,
    /// Last value passed to `update_pass_constants`, restored after a reallocation.
    last_pass_constants: PassConstants,

    depth_buffer: DepthBuffer<B>,
    swap_chain: SwapChain<B>,

    fence: B::Fence,
    queue: B::Queue,
    device: Arc<B::Device>,
    window: B::Window,

    config: RendererConfig,
    state: FrameState,
    viewport: Viewport,
    scissor: ScissorRect,
    /// Last value signaled on `fence`.
    fence_value: u64,
    frame_number: u64,
    /// Buffer count requested for windowed mode.
    back_buffer_count: u32,
    windowed: Option<WindowedState>,
}

impl<B: Backend> Renderer<B> {
    /// Creates the renderer with the embedded default shaders.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Config`] for an invalid configuration and
    /// [`RendererError::Init`] naming the step that failed otherwise.
    pub fn init(
        window: B::Window,
        width: u32,
        height: u32,
        config: RendererConfig,
    ) -> RendererResult<Self> {
        Self::init_with_shaders(window, width, height, config, &ShaderSources::default())
    }

    /// Creates the renderer, compiling `shaders` for the pipeline state.
    pub fn init_with_shaders(
        window: B::Window,
        width: u32,
        height: u32,
        config: RendererConfig,
        shaders: &ShaderSources,
    ) -> RendererResult<Self> {
        use InitStage as Stage;

        config.validate()?;
        let requested = Extent2D::new(width, height);
        if requested.is_empty() {
            return Err(RendererError::InvalidArgument(format!(
                "cannot render to a {} window",
                requested
            )));
        }

        info!("Initializing {} renderer ({})", B::NAME, requested);

        let device = B::create_device(
            &window,
            &DeviceDesc {
                application_name: "gpuframe".to_string(),
                debug_layer: config.debug_layer,
            },
        )
        .map_err(RendererError::init(Stage::Device))?;
        let adapter = device.adapter_info();
        info!("Using adapter '{}' ({:?})", adapter.name, adapter.kind);

        let queue = device
            .create_command_queue()
            .map_err(RendererError::init(Stage::CommandQueue))?;
        let frames = FrameManager::new(&device, config.frames_in_flight as usize)
            .map_err(RendererError::init(Stage::CommandAllocator))?;
        let command_list = device
            .create_command_list(frames.current().allocator())
            .map_err(RendererError::init(Stage::CommandList))?;
        let fence = device
            .create_fence(0)
            .map_err(RendererError::init(Stage::Fence))?;

        let swap_chain = SwapChain::new(
            &device,
            &queue,
            &window,
            &SwapChainDesc {
                extent: requested,
                buffer_count: config.back_buffer_count,
                format: BACK_BUFFER_FORMAT,
                vsync: config.vsync,
            },
        )
        .map_err(RendererError::init(Stage::SwapChain))?;
        let extent = swap_chain.extent();

        let depth_buffer = DepthBuffer::with_default_format(&device, extent)
            .map_err(RendererError::init(Stage::DepthStencil))?;

        let mut cbv_heap = create_heap::<B>(&device, DescriptorHeapKind::ConstantBuffer, 1)
            .map_err(RendererError::init(Stage::DescriptorHeaps))?;
        let srv_heap =
            create_heap::<B>(&device, DescriptorHeapKind::ShaderResource, config.max_textures)
                .map_err(RendererError::init(Stage::DescriptorHeaps))?;
        let sampler_heap =
            create_heap::<B>(&device, DescriptorHeapKind::Sampler, config.max_samplers)
                .map_err(RendererError::init(Stage::DescriptorHeaps))?;

        let pass_constants =
            create_pass_constants::<B>(&device, &mut cbv_heap, frames.frames_in_flight() as u32)
                .map_err(RendererError::init(Stage::ConstantBuffer))?;

        let vertex_shader = device
            .compile_shader(ShaderStage::Vertex, &shaders.vertex)
            .map_err(RendererError::init(Stage::Shaders))?;
        let pixel_shader = device
            .compile_shader(ShaderStage::Pixel, &shaders.pixel)
            .map_err(RendererError::init(Stage::Shaders))?;

        let root_signature = device
            .create_root_signature(&root_signature_desc(&config))
            .map_err(RendererError::init(Stage::RootSignature))?;
        let pipeline_state = device
            .create_pipeline_state(
                &root_signature,
                &vertex_shader,
                &pixel_shader,
                &PipelineStateDesc {
                    input_layout: Vertex::input_layout(),
                    render_target_format: swap_chain.format(),
                    depth_format: depth_buffer.format(),
                    cull_mode: CullMode::Back,
                    depth_test: true,
                },
            )
            .map_err(RendererError::init(Stage::PipelineState))?;

        info!(
            "Renderer initialized: {} frame(s) in flight, {} back buffer(s), {} texture / {} sampler slot(s)",
            frames.frames_in_flight(),
            swap_chain.buffer_count(),
            config.max_textures,
            config.max_samplers
        );

        Ok(Self {
            command_list,
            frames,
            pipeline_state,
            root_signature,
            textures: Registry::new(DescriptorHeapKind::ShaderResource, config.max_textures),
            samplers: Registry::new(DescriptorHeapKind::Sampler, config.max_samplers),
            srv_heap,
            sampler_heap,
            cbv_heap,
            pass_constants,
            last_pass_constants: PassConstants::default(),
            depth_buffer,
            swap_chain,
            fence,
            queue,
            device,
            window,
            back_buffer_count: config.back_buffer_count,
            config,
            state: FrameState::Idle,
            viewport: Viewport::from_extent(extent),
            scissor: ScissorRect::from_extent(extent),
            fence_value: 0,
            frame_number: 0,
            windowed: None,
        })
    }

    // ------------------------------------------------------------------
    // State machine plumbing
    // ------------------------------------------------------------------

    /// The state `operation` leads to, or the error explaining why it cannot run.
    fn transition(&self, operation: Operation) -> RendererResult<FrameState> {
        if self.state.is_lost() {
            return Err(RendererError::DeviceLost);
        }
        self.state
            .after(operation)
            .ok_or(RendererError::InvalidState {
                operation: operation.name(),
                state: self.state,
            })
    }

    /// Converts an RHI failure, entering `Lost` if the device went away.
    fn check<T>(&mut self, result: RhiResult<T>) -> RendererResult<T> {
        self.check_lost(result.map_err(RendererError::from))
    }

    fn check_lost<T>(&mut self, result: RendererResult<T>) -> RendererResult<T> {
        result.map_err(|e| {
            if e.is_device_lost() && !self.state.is_lost() {
                error!("Device lost while {}", self.state);
                self.state = FrameState::Lost;
            }
            e
        })
    }

    /// Blocks until the GPU has finished with the current frame slot.
    fn wait_for_current_slot(&self) -> RhiResult<()> {
        let value = self.frames.current().fence_value();
        if self.fence.completed_value()? < value {
            debug!("Waiting for fence value {} (frame slot {})", value, self.frames.current_index());
            self.fence.wait(value, self.config.fence_timeout())?;
        }
        Ok(())
    }

    /// Blocks until every signaled fence value has completed.
    fn flush(&self) -> RhiResult<()> {
        if self.fence.completed_value()? < self.fence_value {
            self.fence.wait(self.fence_value, self.config.fence_timeout())?;
        }
        Ok(())
    }

    fn sync_interval(&self) -> u32 {
        if self.config.vsync { 1 } else { 0 }
    }

    // ------------------------------------------------------------------
    // Frame protocol
    // ------------------------------------------------------------------

    /// Starts recording a frame into the current back buffer.
    ///
    /// Waits for the current frame slot, resets its allocator and the command
    /// list, then records the frame preamble: viewport, scissor, back buffer
    /// transition, clears, render targets, heaps, pipeline and root bindings.
    pub fn new_frame(&mut self) -> RendererResult<()> {
        let next = self.transition(Operation::NewFrame)?;
        let result = self.begin_frame();
        self.check(result)?;
        self.state = next;
        Ok(())
    }

    fn begin_frame(&mut self) -> RhiResult<()> {
        self.begin_recording()?;

        let back_buffer = self.swap_chain.current_back_buffer()?;
        let render_target = self.swap_chain.current_back_buffer_view()?;
        let depth_stencil = self.depth_buffer.view()?;
        let frame_index = self.frames.current_index() as u32;
        let constants_offset = self.pass_constants.byte_offset(frame_index) as u32;

        let list = &mut self.command_list;
        list.set_viewports(&[self.viewport]);
        list.set_scissor_rects(&[self.scissor]);
        list.transition_barrier(back_buffer, ResourceState::Present, ResourceState::RenderTarget);
        self.depth_buffer.record_initial_transition(list);

        list.clear_render_target_view(&render_target, self.config.clear_color);
        list.clear_depth_stencil_view(&depth_stencil, DEPTH_CLEAR_VALUE, 0);
        list.set_render_targets(&[render_target], Some(&depth_stencil));

        list.set_descriptor_heaps(&[&self.cbv_heap, &self.srv_heap, &self.sampler_heap]);
        list.set_pipeline_state(&self.pipeline_state);
        list.set_graphics_root_signature(&self.root_signature);
        list.set_graphics_root_constant_buffer(
            PASS_CONSTANTS_PARAMETER,
            &self.cbv_heap,
            0,
            constants_offset,
        );
        list.set_graphics_root_descriptor_table(TEXTURE_TABLE_PARAMETER, &self.srv_heap);
        list.set_graphics_root_descriptor_table(SAMPLER_TABLE_PARAMETER, &self.sampler_heap);

        debug!(
            "Frame {} recording (slot {}, back buffer {})",
            self.frame_number,
            frame_index,
            self.swap_chain.current_back_buffer_index()
        );
        Ok(())
    }

    /// Waits for the current slot and reopens the command list against its allocator.
    fn begin_recording(&mut self) -> RhiResult<()> {
        self.wait_for_current_slot()?;
        self.frames.current_mut().reset_allocator()?;
        self.command_list.reset(self.frames.current().allocator())
    }

    /// The open command list. Only available while recording.
    ///
    /// Record into it but do not close it; [`Renderer::execute_command_list`]
    /// closes and submits it.
    pub fn command_list(&mut self) -> RendererResult<&mut B::CommandList> {
        self.transition(Operation::CommandList)?;
        Ok(&mut self.command_list)
    }

    /// Copies `constants` into the current frame slot's constant buffer element.
    ///
    /// Rejected while a submission is pending, when the element may still be
    /// read by the GPU.
    pub fn update_pass_constants(&mut self, constants: &PassConstants) -> RendererResult<()> {
        self.transition(Operation::UpdatePassConstants)?;
        let index = self.frames.current_index() as u32;
        let result = self.pass_constants.copy_data(index, constants);
        self.check_lost(result)?;
        self.last_pass_constants = *constants;
        Ok(())
    }

    /// Closes and submits the command list, then signals the next fence value.
    ///
    /// For a frame, the back buffer is first transitioned to the present state.
    pub fn execute_command_list(&mut self) -> RendererResult<()> {
        let next = self.transition(Operation::ExecuteCommandList)?;
        let present = self.state == FrameState::Recording(Pass::Frame);
        let result = self.submit(present);
        self.check(result)?;
        self.state = next;
        Ok(())
    }

    fn submit(&mut self, present: bool) -> RhiResult<()> {
        if self.command_list.is_closed() {
            return Err(RhiError::InvalidArgument(
                "the command list was closed by its recorder".to_string(),
            ));
        }
        if present {
            let back_buffer = self.swap_chain.current_back_buffer()?;
            self.command_list.transition_barrier(
                back_buffer,
                ResourceState::RenderTarget,
                ResourceState::Present,
            );
        }
        self.command_list.close()?;
        self.queue.execute_command_lists(&[&self.command_list])?;

        let value = self.fence_value + 1;
        self.queue.signal(&self.fence, value)?;
        self.fence_value = value;
        self.frames.current_mut().set_fence_value(value);
        debug!("Submitted command list, fence value {}", value);
        Ok(())
    }

    /// Presents the frame and moves to the next frame slot.
    ///
    /// Blocks until the next slot's previous submission has completed. An
    /// out-of-date or suboptimal swap chain is recreated at the window's
    /// current size.
    ///
    /// Once the present succeeds the frame is complete and the state returns
    /// to `Idle`, even if the wait or the recreation then fails; that error is
    /// still returned and the wait is repeated by the next `new_frame`.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        let next = self.transition(Operation::EndFrame)?;
        let result = self.swap_chain.present(&self.queue, self.sync_interval());
        let status = self.check(result)?;
        self.frame_number += 1;
        self.frames.advance();
        self.state = next;

        let result = self.finish_present(status);
        self.check(result)
    }

    fn finish_present(&mut self, status: PresentStatus) -> RhiResult<()> {
        self.wait_for_current_slot()?;

        match status {
            PresentStatus::Presented => {}
            PresentStatus::Suboptimal | PresentStatus::OutOfDate => {
                let extent = self.window.inner_extent();
                if extent.is_empty() {
                    debug!("Present reported {:?} for a minimized window", status);
                } else {
                    warn!("Present reported {:?}, recreating buffers at {}", status, extent);
                    self.flush()?;
                    self.resize_targets(self.swap_chain.buffer_count(), extent)?;
                }
            }
        }
        Ok(())
    }

    /// Blocks until all submitted work has completed.
    ///
    /// Completes an upload submission; in any other state the state is kept.
    pub fn flush_command_queue(&mut self) -> RendererResult<()> {
        let next = self.transition(Operation::FlushCommandQueue)?;
        let result = self.flush();
        self.check(result)?;
        self.state = next;
        Ok(())
    }

    /// Opens the command list for ad hoc recording outside a frame, such as
    /// resource uploads. Finish with `execute_command_list` and
    /// `flush_command_queue`.
    pub fn reset_command_list(&mut self) -> RendererResult<()> {
        let next = self.transition(Operation::ResetCommandList)?;
        let result = self.begin_recording();
        self.check(result)?;
        self.state = next;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resize and display modes
    // ------------------------------------------------------------------

    /// Recreates the back buffers, depth buffer and pass constants at `width` x `height`.
    pub fn set_size(&mut self, width: u32, height: u32) -> RendererResult<()> {
        let next = self.transition(Operation::SetSize)?;
        let extent = Extent2D::new(width, height);
        if extent.is_empty() {
            return Err(RendererError::InvalidArgument(format!(
                "cannot resize to {}",
                extent
            )));
        }

        let result = self.flush();
        self.check(result)?;
        let result = self.resize_targets(self.back_buffer_count, extent);
        self.check(result)?;
        self.rebuild_pass_constants()?;
        self.state = next;
        Ok(())
    }

    /// Recreates the size-dependent targets. The GPU must be idle.
    fn resize_targets(&mut self, buffer_count: u32, extent: Extent2D) -> RhiResult<()> {
        self.swap_chain.resize(buffer_count, extent)?;
        let extent = self.swap_chain.extent();
        self.depth_buffer.resize(&self.device, extent)?;
        self.viewport = Viewport::from_extent(extent);
        self.scissor = ScissorRect::from_extent(extent);
        info!(
            "Render targets resized to {} ({} back buffer(s))",
            extent,
            self.swap_chain.buffer_count()
        );
        Ok(())
    }

    /// Reallocates the pass constants buffer and rewrites its view.
    fn rebuild_pass_constants(&mut self) -> RendererResult<()> {
        let len = self.frames.frames_in_flight() as u32;
        let result = create_pass_constants::<B>(&self.device, &mut self.cbv_heap, len);
        self.pass_constants = self.check(result)?;
        for index in 0..len {
            let result = self.pass_constants.copy_data(index, &self.last_pass_constants);
            self.check_lost(result)?;
        }
        Ok(())
    }

    /// Switches between windowed mode and exclusive fullscreen.
    ///
    /// Entering picks the largest display mode and remembers the windowed
    /// size; leaving restores it together with the back buffer count.
    pub fn set_full_screen(&mut self, full_screen: bool) -> RendererResult<()> {
        let next = self.transition(Operation::SetFullScreen)?;
        if full_screen == self.swap_chain.is_fullscreen() {
            return Ok(());
        }

        let result = self.flush();
        self.check(result)?;
        let result = if full_screen {
            self.enter_full_screen()
        } else {
            self.leave_full_screen()
        };
        self.check(result)?;
        self.rebuild_pass_constants()?;
        self.state = next;
        Ok(())
    }

    fn enter_full_screen(&mut self) -> RhiResult<()> {
        let modes = self.swap_chain.display_modes(&self.window)?;
        let mode = best_display_mode(&modes).ok_or_else(|| {
            RhiError::SwapchainError("the output offers no display modes".to_string())
        })?;

        let windowed = WindowedState {
            extent: self.swap_chain.extent(),
            back_buffer_count: self.back_buffer_count,
        };
        self.swap_chain.set_fullscreen(&self.window, Some(&mode))?;
        self.windowed = Some(windowed);
        info!("Entering fullscreen: {}", mode);
        self.resize_targets(self.back_buffer_count, mode.extent())
    }

    fn leave_full_screen(&mut self) -> RhiResult<()> {
        self.swap_chain.set_fullscreen(&self.window, None)?;
        let windowed = self.windowed.take().unwrap_or(WindowedState {
            extent: self.window.inner_extent(),
            back_buffer_count: self.back_buffer_count,
        });
        self.back_buffer_count = windowed.back_buffer_count;
        info!("Leaving fullscreen, restoring {}", windowed.extent);
        self.resize_targets(windowed.back_buffer_count, windowed.extent)
    }

    /// Display modes of the output hosting the window, queried now.
    pub fn display_modes(&mut self) -> RendererResult<std::vec::IntoIter<DisplayMode>> {
        if self.state.is_lost() {
            return Err(RendererError::DeviceLost);
        }
        let result = self.swap_chain.display_modes(&self.window);
        Ok(self.check(result)?.into_iter())
    }

    // ------------------------------------------------------------------
    // Descriptor registries
    // ------------------------------------------------------------------

    /// Writes a shader resource view of `texture` into the next texture slot.
    ///
    /// The registry only observes the texture; the caller keeps it alive.
    /// Returns the slot.
    pub fn add_texture(&mut self, texture: &Arc<B::Texture>) -> RendererResult<u32> {
        self.transition(Operation::AddDescriptor)?;
        let slot = self.textures.next_slot()?;
        let result = self
            .device
            .create_shader_resource_view(&mut self.srv_heap, slot, texture);
        self.check(result)?;
        self.textures.push(Arc::downgrade(texture));
        debug!("Registered texture in slot {}", slot);
        Ok(slot)
    }

    /// Writes `desc` into the next sampler slot and returns the slot.
    pub fn add_sample(&mut self, desc: SamplerDesc) -> RendererResult<u32> {
        self.transition(Operation::AddDescriptor)?;
        let slot = self.samplers.next_slot()?;
        let result = self
            .device
            .create_sampler(&mut self.sampler_heap, slot, &desc);
        self.check(result)?;
        self.samplers.push(desc);
        debug!("Registered sampler in slot {}", slot);
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Viewport applied at the start of the next frame.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Scissor rectangle applied at the start of the next frame.
    pub fn set_scissor_rect(&mut self, scissor: ScissorRect) {
        self.scissor = scissor;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor_rect(&self) -> ScissorRect {
        self.scissor
    }

    pub fn window(&self) -> &B::Window {
        &self.window
    }

    pub fn device(&self) -> &Arc<B::Device> {
        &self.device
    }

    pub fn command_queue(&self) -> &B::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        self.device.adapter_info()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// View of the back buffer the next frame renders into.
    pub fn current_back_buffer_view(&self) -> RendererResult<AttachmentView> {
        Ok(self.swap_chain.current_back_buffer_view()?)
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        self.swap_chain.current_back_buffer_index()
    }

    pub fn back_buffer_count(&self) -> u32 {
        self.swap_chain.buffer_count()
    }

    pub fn depth_stencil_view(&self) -> RendererResult<AttachmentView> {
        Ok(self.depth_buffer.view()?)
    }

    /// Size of the back buffers.
    pub fn extent(&self) -> Extent2D {
        self.swap_chain.extent()
    }

    pub fn is_full_screen(&self) -> bool {
        self.swap_chain.is_fullscreen()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index of the current frame slot.
    pub fn frame_index(&self) -> usize {
        self.frames.current_index()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.frames_in_flight()
    }

    /// Number of completed `end_frame` calls.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Last fence value signaled; equals the number of submissions.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Fence value the GPU has reached.
    pub fn completed_fence_value(&mut self) -> RendererResult<u64> {
        let result = self.fence.completed_value();
        self.check(result)
    }

    pub fn texture_registry(&self) -> &TextureRegistry<B> {
        &self.textures
    }

    pub fn sampler_registry(&self) -> &SamplerRegistry {
        &self.samplers
    }

    pub fn texture_heap(&self) -> &B::DescriptorHeap {
        &self.srv_heap
    }

    pub fn sampler_heap(&self) -> &B::DescriptorHeap {
        &self.sampler_heap
    }

    pub fn constant_buffer_heap(&self) -> &B::DescriptorHeap {
        &self.cbv_heap
    }
}

impl<B: Backend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if !self.state.is_lost()
            && let Err(e) = self.flush()
        {
            warn!("Failed to flush before teardown: {}", e);
        }
        self.textures.clear();
        self.samplers.clear();
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle: {}", e);
        }
        info!(
            "Renderer destroyed after {} frame(s), fence value {}",
            self.frame_number, self.fence_value
        );
    }
}

fn create_heap<B: Backend>(
    device: &Arc<B::Device>,
    kind: DescriptorHeapKind,
    capacity: u32,
) -> RhiResult<B::DescriptorHeap> {
    device.create_descriptor_heap(&DescriptorHeapDesc {
        kind,
        capacity,
        shader_visible: true,
    })
}

/// One constant buffer element per frame slot, viewed through slot 0 of
/// `heap`. Frames select their element with the bind-time byte offset.
fn create_pass_constants<B: Backend>(
    device: &Arc<B::Device>,
    heap: &mut B::DescriptorHeap,
    frames_in_flight: u32,
) -> RhiResult<UploadBuffer<B, PassConstants>> {
    heap.reset();
    let buffer = UploadBuffer::new(device, frames_in_flight, BufferUsage::Constant)?;
    device.create_constant_buffer_view(heap, 0, buffer.buffer(), 0, buffer.stride())?;
    Ok(buffer)
}

fn root_signature_desc(config: &RendererConfig) -> RootSignatureDesc {
    RootSignatureDesc {
        parameters: vec![
            RootParameter::ConstantBuffer { heap_capacity: 1 },
            RootParameter::DescriptorTable {
                kind: DescriptorHeapKind::ShaderResource,
                count: config.max_textures,
            },
            RootParameter::DescriptorTable {
                kind: DescriptorHeapKind::Sampler,
                count: config.max_samplers,
            },
        ],
    }
}
