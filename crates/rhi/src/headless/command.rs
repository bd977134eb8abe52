//! Command allocators and lists that record into plain data for the GPU worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::Headless;
use super::descriptor::HeadlessDescriptorHeap;
use super::resources::{BufferMemory, HeadlessBuffer, HeadlessPipelineState, HeadlessRootSignature};
use crate::backend::{CommandAllocator, CommandList};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AttachmentView, DescriptorHandle, ImageHandle, IndexFormat, ResourceState, ScissorRect,
    Viewport,
};

/// A command as the GPU worker executed it.
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessCommand {
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<ScissorRect>),
    Barrier {
        image: u64,
        before: ResourceState,
        after: ResourceState,
    },
    ClearRenderTarget {
        handle: DescriptorHandle,
        color: [f32; 4],
    },
    ClearDepthStencil {
        handle: DescriptorHandle,
        depth: f32,
        stencil: u8,
    },
    SetRenderTargets {
        render_targets: Vec<DescriptorHandle>,
        depth_stencil: Option<DescriptorHandle>,
    },
    SetDescriptorHeaps(Vec<u32>),
    SetPipelineState(u64),
    SetRootSignature(u64),
    /// `contents` holds the bytes the view covered when the GPU reached this command.
    SetRootConstantBuffer {
        parameter: u32,
        heap: u32,
        slot: u32,
        byte_offset: u32,
        contents: Vec<u8>,
    },
    SetRootDescriptorTable {
        parameter: u32,
        heap: u32,
    },
    SetVertexBuffer {
        buffer: u64,
        stride: u32,
    },
    SetIndexBuffer {
        buffer: u64,
        format: IndexFormat,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
}

/// One executed submission.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedList {
    pub list: u64,
    pub commands: Vec<HeadlessCommand>,
}

impl ExecutedList {
    /// Contents of every constant buffer bound in this list, in order.
    pub fn bound_constants(&self) -> impl Iterator<Item = &[u8]> {
        self.commands.iter().filter_map(|command| match command {
            HeadlessCommand::SetRootConstantBuffer { contents, .. } => Some(contents.as_slice()),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, HeadlessCommand::Draw { .. } | HeadlessCommand::DrawIndexed { .. }))
            .count()
    }
}

/// A recorded command, resolved into a [`HeadlessCommand`] at execution.
#[derive(Clone, Debug)]
pub(crate) enum Recorded {
    Ready(HeadlessCommand),
    ConstantBuffer {
        parameter: u32,
        heap: u32,
        slot: u32,
        byte_offset: u32,
        source: Option<(Arc<BufferMemory>, u64, u64)>,
    },
}

impl Recorded {
    pub(crate) fn resolve(self) -> HeadlessCommand {
        match self {
            Recorded::Ready(command) => command,
            Recorded::ConstantBuffer {
                parameter,
                heap,
                slot,
                byte_offset,
                source,
            } => HeadlessCommand::SetRootConstantBuffer {
                parameter,
                heap,
                slot,
                byte_offset,
                contents: source
                    .map(|(memory, offset, size)| memory.snapshot(offset + byte_offset as u64, size))
                    .unwrap_or_default(),
            },
        }
    }
}

/// Lists recorded against this allocator that the GPU has not finished.
#[derive(Debug, Default)]
pub(crate) struct AllocatorState {
    in_flight: AtomicU32,
}

impl AllocatorState {
    pub(crate) fn submitted(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn retired(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct HeadlessCommandAllocator {
    id: u64,
    state: Arc<AllocatorState>,
    resets: u64,
}

impl HeadlessCommandAllocator {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(AllocatorState::default()),
            resets: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of successful resets.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }
}

impl CommandAllocator for HeadlessCommandAllocator {
    fn reset(&mut self) -> RhiResult<()> {
        let in_flight = self.state.in_flight();
        if in_flight > 0 {
            return Err(RhiError::InvalidArgument(format!(
                "command allocator {} reset while {} list(s) are still executing",
                self.id, in_flight
            )));
        }
        self.resets += 1;
        Ok(())
    }
}

/// Records commands into a vector.
#[derive(Debug)]
pub struct HeadlessCommandList {
    id: u64,
    closed: bool,
    allocator: Arc<AllocatorState>,
    commands: Vec<Recorded>,
}

impl HeadlessCommandList {
    pub(crate) fn new(id: u64, allocator: &HeadlessCommandAllocator) -> Self {
        Self {
            id,
            closed: true,
            allocator: allocator.state.clone(),
            commands: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Commands recorded since the last reset.
    pub fn recorded_len(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn allocator_state(&self) -> &Arc<AllocatorState> {
        &self.allocator
    }

    pub(crate) fn recorded(&self) -> &[Recorded] {
        &self.commands
    }

    fn push(&mut self, command: HeadlessCommand) {
        debug_assert!(!self.closed, "recording into closed command list {}", self.id);
        self.commands.push(Recorded::Ready(command));
    }
}

impl CommandList<Headless> for HeadlessCommandList {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn reset(&mut self, allocator: &HeadlessCommandAllocator) -> RhiResult<()> {
        if !self.closed {
            return Err(RhiError::InvalidArgument(format!(
                "command list {} reset while open",
                self.id
            )));
        }
        self.allocator = allocator.state.clone();
        self.commands.clear();
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) -> RhiResult<()> {
        if self.closed {
            return Err(RhiError::InvalidArgument(format!(
                "command list {} is already closed",
                self.id
            )));
        }
        self.closed = true;
        Ok(())
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.push(HeadlessCommand::SetViewports(viewports.to_vec()));
    }

    fn set_scissor_rects(&mut self, rects: &[ScissorRect]) {
        self.push(HeadlessCommand::SetScissorRects(rects.to_vec()));
    }

    fn transition_barrier(&mut self, image: ImageHandle, before: ResourceState, after: ResourceState) {
        self.push(HeadlessCommand::Barrier {
            image: image.raw,
            before,
            after,
        });
    }

    fn clear_render_target_view(&mut self, view: &AttachmentView, color: [f32; 4]) {
        self.push(HeadlessCommand::ClearRenderTarget {
            handle: view.handle,
            color,
        });
    }

    fn clear_depth_stencil_view(&mut self, view: &AttachmentView, depth: f32, stencil: u8) {
        self.push(HeadlessCommand::ClearDepthStencil {
            handle: view.handle,
            depth,
            stencil,
        });
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[AttachmentView],
        depth_stencil: Option<&AttachmentView>,
    ) {
        self.push(HeadlessCommand::SetRenderTargets {
            render_targets: render_targets.iter().map(|v| v.handle).collect(),
            depth_stencil: depth_stencil.map(|v| v.handle),
        });
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&HeadlessDescriptorHeap]) {
        self.push(HeadlessCommand::SetDescriptorHeaps(
            heaps.iter().map(|heap| heap.id()).collect(),
        ));
    }

    fn set_pipeline_state(&mut self, pipeline_state: &HeadlessPipelineState) {
        self.push(HeadlessCommand::SetPipelineState(pipeline_state.id()));
    }

    fn set_graphics_root_signature(&mut self, root_signature: &HeadlessRootSignature) {
        self.push(HeadlessCommand::SetRootSignature(root_signature.id()));
    }

    fn set_graphics_root_constant_buffer(
        &mut self,
        parameter: u32,
        heap: &HeadlessDescriptorHeap,
        slot: u32,
        byte_offset: u32,
    ) {
        debug_assert!(!self.closed, "recording into closed command list {}", self.id);
        self.commands.push(Recorded::ConstantBuffer {
            parameter,
            heap: heap.id(),
            slot,
            byte_offset,
            source: heap.constant_buffer_source(slot),
        });
    }

    fn set_graphics_root_descriptor_table(&mut self, parameter: u32, heap: &HeadlessDescriptorHeap) {
        self.push(HeadlessCommand::SetRootDescriptorTable {
            parameter,
            heap: heap.id(),
        });
    }

    fn set_vertex_buffer(&mut self, buffer: &HeadlessBuffer, stride: u32) {
        self.push(HeadlessCommand::SetVertexBuffer {
            buffer: buffer.id(),
            stride,
        });
    }

    fn set_index_buffer(&mut self, buffer: &HeadlessBuffer, format: IndexFormat) {
        self.push(HeadlessCommand::SetIndexBuffer {
            buffer: buffer.id(),
            format,
        });
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.push(HeadlessCommand::Draw {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.push(HeadlessCommand::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_starts_closed() {
        let allocator = HeadlessCommandAllocator::new(1);
        let mut list = HeadlessCommandList::new(2, &allocator);
        assert!(list.is_closed());
        assert!(list.close().is_err());

        list.reset(&allocator).unwrap();
        assert!(!list.is_closed());
        assert!(list.reset(&allocator).is_err());
    }

    #[test]
    fn test_reset_clears_recorded_commands() {
        let allocator = HeadlessCommandAllocator::new(1);
        let mut list = HeadlessCommandList::new(2, &allocator);
        list.reset(&allocator).unwrap();
        list.draw_instanced(3, 1, 0, 0);
        assert_eq!(list.recorded_len(), 1);
        list.close().unwrap();
        list.reset(&allocator).unwrap();
        assert_eq!(list.recorded_len(), 0);
    }

    #[test]
    fn test_allocator_reset_refused_while_in_flight() {
        let mut allocator = HeadlessCommandAllocator::new(1);
        allocator.state.submitted();
        assert!(allocator.reset().is_err());
        allocator.state.retired();
        assert!(allocator.reset().is_ok());
        assert_eq!(allocator.reset_count(), 1);
    }
}
