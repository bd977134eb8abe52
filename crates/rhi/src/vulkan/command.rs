//! Command allocators as command pools and command lists as primary
//! command buffers recorded with dynamic rendering.
//!
//! Attachments are bound with `set_render_targets` but rendering only begins
//! at the first draw, so clears recorded before it become `CLEAR` load ops.
//! Clears nobody draws after are flushed as empty rendering scopes when the
//! list transitions an image or closes.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use tracing::{trace, warn};

use super::Vulkan;
use super::convert;
use super::descriptor::VulkanDescriptorHeap;
use super::device::VulkanDevice;
use super::pipeline::{VulkanPipelineState, VulkanRootSignature};
use super::resources::VulkanBuffer;
use crate::backend::{CommandAllocator, CommandList, DescriptorHeap as _};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AttachmentView, ImageHandle, IndexFormat, ResourceState, ScissorRect, Viewport,
};

/// A command pool holding the one primary buffer lists record into.
pub struct VulkanCommandAllocator {
    device: Arc<VulkanDevice>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl VulkanCommandAllocator {
    pub(crate) fn new(device: Arc<VulkanDevice>) -> RhiResult<Self> {
        let family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: valid device and create info.
        let pool = unsafe { device.handle().create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: the pool was just created from this device.
        let buffer = match unsafe { device.handle().allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                // SAFETY: the pool has no buffers and is not in use.
                unsafe { device.handle().destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        Ok(Self {
            device,
            pool,
            buffer,
        })
    }
}

impl CommandAllocator for VulkanCommandAllocator {
    fn reset(&mut self) -> RhiResult<()> {
        // SAFETY: callers only reset after the fence covering this pool's work.
        unsafe {
            self.device
                .handle()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for VulkanCommandAllocator {
    fn drop(&mut self) {
        // SAFETY: destroying the pool frees its buffer; owners flush the queue first.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
    }
}

struct PendingClear {
    target: AttachmentView,
    value: vk::ClearValue,
}

pub struct VulkanCommandList {
    device: Arc<VulkanDevice>,
    buffer: vk::CommandBuffer,
    closed: bool,
    pipeline_layout: vk::PipelineLayout,
    color_targets: Vec<AttachmentView>,
    depth_target: Option<AttachmentView>,
    pending_clears: Vec<PendingClear>,
    rendering: bool,
}

impl VulkanCommandList {
    pub(crate) fn new(device: Arc<VulkanDevice>, allocator: &VulkanCommandAllocator) -> Self {
        Self {
            device,
            buffer: allocator.buffer,
            closed: true,
            pipeline_layout: vk::PipelineLayout::null(),
            color_targets: Vec::new(),
            depth_target: None,
            pending_clears: Vec::new(),
            rendering: false,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    fn queue_clear(&mut self, target: &AttachmentView, value: vk::ClearValue) {
        self.end_rendering();
        self.pending_clears
            .retain(|clear| clear.target.view != target.view);
        self.pending_clears.push(PendingClear {
            target: *target,
            value,
        });
    }

    fn take_clear(&mut self, view: u64) -> Option<vk::ClearValue> {
        let index = self
            .pending_clears
            .iter()
            .position(|clear| clear.target.view == view)?;
        Some(self.pending_clears.swap_remove(index).value)
    }

    fn begin_rendering(&mut self) {
        if self.rendering {
            return;
        }
        let Some(extent) = self
            .color_targets
            .first()
            .or(self.depth_target.as_ref())
            .map(|target| target.extent)
        else {
            warn!("Draw recorded with no render targets bound");
            return;
        };

        let targets = self.color_targets.clone();
        let colors: Vec<vk::RenderingAttachmentInfo> = targets
            .iter()
            .map(|target| {
                let clear = self.take_clear(target.view);
                attachment_info(
                    target,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    clear,
                )
            })
            .collect();

        let depth_target = self.depth_target;
        let depth = depth_target.map(|target| {
            let clear = self.take_clear(target.view);
            (target, clear)
        });
        let depth_info = depth.map(|(target, clear)| {
            attachment_info(
                &target,
                convert::depth_attachment_layout(target.format()),
                clear,
            )
        });

        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth_info) = depth_info.as_ref() {
            info = info.depth_attachment(depth_info);
            if depth.is_some_and(|(target, _)| target.format().has_stencil()) {
                info = info.stencil_attachment(depth_info);
            }
        }

        // SAFETY: recording state, attachments are live views in the layouts named.
        unsafe { self.raw().cmd_begin_rendering(self.buffer, &info) };
        self.rendering = true;
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            // SAFETY: matches the cmd_begin_rendering above.
            unsafe { self.raw().cmd_end_rendering(self.buffer) };
            self.rendering = false;
        }
    }

    /// Applies clears that no draw consumed.
    fn flush_clears(&mut self) {
        self.end_rendering();
        for clear in std::mem::take(&mut self.pending_clears) {
            let target = clear.target;
            let is_depth = target.format().is_depth();
            let layout = if is_depth {
                convert::depth_attachment_layout(target.format())
            } else {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            };
            let attachment = attachment_info(&target, layout, Some(clear.value));
            let colors: &[vk::RenderingAttachmentInfo<'_>] = if is_depth {
                &[]
            } else {
                std::slice::from_ref(&attachment)
            };
            let mut info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D {
                        width: target.extent.width,
                        height: target.extent.height,
                    },
                })
                .layer_count(1)
                .color_attachments(colors);
            if is_depth {
                info = info.depth_attachment(&attachment);
                if target.format().has_stencil() {
                    info = info.stencil_attachment(&attachment);
                }
            }
            // SAFETY: as in begin_rendering, for a single attachment.
            unsafe {
                self.raw().cmd_begin_rendering(self.buffer, &info);
                self.raw().cmd_end_rendering(self.buffer);
            }
        }
    }
}

fn attachment_info(
    target: &AttachmentView,
    layout: vk::ImageLayout,
    clear: Option<vk::ClearValue>,
) -> vk::RenderingAttachmentInfo<'static> {
    let info = vk::RenderingAttachmentInfo::default()
        .image_view(vk::ImageView::from_raw(target.view))
        .image_layout(layout)
        .store_op(vk::AttachmentStoreOp::STORE);
    match clear {
        Some(value) => info.load_op(vk::AttachmentLoadOp::CLEAR).clear_value(value),
        None => info.load_op(vk::AttachmentLoadOp::LOAD),
    }
}

impl CommandList<Vulkan> for VulkanCommandList {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn reset(&mut self, allocator: &VulkanCommandAllocator) -> RhiResult<()> {
        if !self.closed {
            return Err(RhiError::InvalidArgument(
                "command list reset while open".to_string(),
            ));
        }
        self.buffer = allocator.buffer;
        self.pipeline_layout = vk::PipelineLayout::null();
        self.color_targets.clear();
        self.depth_target = None;
        self.pending_clears.clear();
        self.rendering = false;

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the buffer is not pending; its pool allows individual resets.
        unsafe { self.raw().begin_command_buffer(self.buffer, &begin_info)? };
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        if self.closed {
            return Err(RhiError::InvalidArgument(
                "command list is already closed".to_string(),
            ));
        }
        self.flush_clears();
        // SAFETY: recording state with no open rendering scope.
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        self.closed = true;
        Ok(())
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        let viewports: Vec<vk::Viewport> = viewports
            .iter()
            // Negative height keeps clip-space +Y pointing up (VK_KHR_maintenance1, core in 1.1).
            .map(|v| vk::Viewport {
                x: v.x,
                y: v.y + v.height,
                width: v.width,
                height: -v.height,
                min_depth: v.min_depth,
                max_depth: v.max_depth,
            })
            .collect();
        // SAFETY: recording state; the pipeline declares viewport as dynamic.
        unsafe { self.raw().cmd_set_viewport(self.buffer, 0, &viewports) };
    }

    fn set_scissor_rects(&mut self, rects: &[ScissorRect]) {
        let scissors: Vec<vk::Rect2D> = rects
            .iter()
            .map(|r| vk::Rect2D {
                offset: vk::Offset2D {
                    x: r.left,
                    y: r.top,
                },
                extent: vk::Extent2D {
                    width: r.width(),
                    height: r.height(),
                },
            })
            .collect();
        // SAFETY: recording state; the pipeline declares scissor as dynamic.
        unsafe { self.raw().cmd_set_scissor(self.buffer, 0, &scissors) };
    }

    fn transition_barrier(&mut self, image: ImageHandle, before: ResourceState, after: ResourceState) {
        self.flush_clears();

        let (old_layout, src_stage, src_access) = convert::barrier_scope(before, image.format, true);
        let (new_layout, dst_stage, dst_access) = convert::barrier_scope(after, image.format, false);
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk::Image::from_raw(image.raw))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: convert::aspect_mask(image.format),
                base_mip_level: 0,
                level_count: image.mip_levels.max(1),
                base_array_layer: 0,
                layer_count: 1,
            });
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        // SAFETY: recording state outside a rendering scope.
        unsafe { self.raw().cmd_pipeline_barrier2(self.buffer, &dependency) };
        trace!("Barrier {:?} -> {:?} on image {:#x}", before, after, image.raw);
    }

    fn clear_render_target_view(&mut self, view: &AttachmentView, color: [f32; 4]) {
        self.queue_clear(
            view,
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        );
    }

    fn clear_depth_stencil_view(&mut self, view: &AttachmentView, depth: f32, stencil: u8) {
        self.queue_clear(
            view,
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: u32::from(stencil),
                },
            },
        );
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[AttachmentView],
        depth_stencil: Option<&AttachmentView>,
    ) {
        self.end_rendering();
        self.color_targets = render_targets.to_vec();
        self.depth_target = depth_stencil.copied();
    }

    /// Descriptor sets are bound per table, so there is nothing to do here.
    fn set_descriptor_heaps(&mut self, _heaps: &[&VulkanDescriptorHeap]) {}

    fn set_pipeline_state(&mut self, pipeline_state: &VulkanPipelineState) {
        // SAFETY: recording state with a live pipeline.
        unsafe {
            self.raw().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_state.handle(),
            )
        };
    }

    fn set_graphics_root_signature(&mut self, root_signature: &VulkanRootSignature) {
        self.pipeline_layout = root_signature.layout();
    }

    fn set_graphics_root_constant_buffer(
        &mut self,
        parameter: u32,
        heap: &VulkanDescriptorHeap,
        slot: u32,
        byte_offset: u32,
    ) {
        let Some(set) = heap.descriptor_set() else {
            warn!("Constant buffer bound from a heap without a descriptor set");
            return;
        };
        // One dynamic offset per array element; only `slot` moves.
        let mut offsets = vec![0u32; heap.desc().capacity as usize];
        if let Some(offset) = offsets.get_mut(slot as usize) {
            *offset = byte_offset;
        }
        // SAFETY: recording state; the set layout matches the root signature's.
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                parameter,
                &[set],
                &offsets,
            )
        };
    }

    fn set_graphics_root_descriptor_table(&mut self, parameter: u32, heap: &VulkanDescriptorHeap) {
        let Some(set) = heap.descriptor_set() else {
            warn!("Descriptor table bound from a heap without a descriptor set");
            return;
        };
        // SAFETY: recording state; the set layout matches the root signature's.
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                parameter,
                &[set],
                &[],
            )
        };
    }

    fn set_vertex_buffer(&mut self, buffer: &VulkanBuffer, _stride: u32) {
        // SAFETY: recording state with a live vertex buffer; the stride is baked
        // into the pipeline's input layout.
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer.handle()], &[0])
        };
    }

    fn set_index_buffer(&mut self, buffer: &VulkanBuffer, format: IndexFormat) {
        // SAFETY: recording state with a live index buffer.
        unsafe {
            self.raw().cmd_bind_index_buffer(
                self.buffer,
                buffer.handle(),
                0,
                convert::index_type(format),
            )
        };
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.begin_rendering();
        // SAFETY: recording state inside a rendering scope.
        unsafe {
            self.raw().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            )
        };
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.begin_rendering();
        // SAFETY: recording state inside a rendering scope.
        unsafe {
            self.raw().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            )
        };
    }
}
