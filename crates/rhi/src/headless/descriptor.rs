use std::sync::Arc;

use super::resources::{BufferMemory, HeadlessBuffer};
use crate::backend::DescriptorHeap;
use crate::types::{AttachmentView, DescriptorHandle, DescriptorHeapDesc, SamplerDesc};

/// What a heap slot describes.
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessDescriptor {
    ConstantBuffer { buffer: u64, offset: u64, size: u64 },
    ShaderResource { texture: u64 },
    Sampler(SamplerDesc),
    RenderTarget(AttachmentView),
    DepthStencil(AttachmentView),
}

#[derive(Debug)]
struct Slot {
    descriptor: HeadlessDescriptor,
    memory: Option<Arc<BufferMemory>>,
}

/// Fixed-capacity slot array.
#[derive(Debug)]
pub struct HeadlessDescriptorHeap {
    id: u32,
    desc: DescriptorHeapDesc,
    increment: u32,
    slots: Vec<Option<Slot>>,
}

impl HeadlessDescriptorHeap {
    pub(crate) fn new(id: u32, desc: DescriptorHeapDesc, increment: u32) -> Self {
        Self {
            id,
            desc,
            increment,
            slots: (0..desc.capacity).map(|_| None).collect(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn desc_ref(&self) -> &DescriptorHeapDesc {
        &self.desc
    }

    pub(crate) fn slot_handle(&self, slot: u32) -> DescriptorHandle {
        self.start_handle().offset(slot, self.increment)
    }

    /// The descriptor written into `slot`, if any.
    pub fn descriptor(&self, slot: u32) -> Option<&HeadlessDescriptor> {
        self.slots
            .get(slot as usize)
            .and_then(|s| s.as_ref())
            .map(|s| &s.descriptor)
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub(crate) fn write(&mut self, slot: u32, descriptor: HeadlessDescriptor) {
        self.slots[slot as usize] = Some(Slot {
            descriptor,
            memory: None,
        });
    }

    pub(crate) fn write_constant_buffer(
        &mut self,
        slot: u32,
        buffer: &HeadlessBuffer,
        offset: u64,
        size: u64,
    ) {
        self.slots[slot as usize] = Some(Slot {
            descriptor: HeadlessDescriptor::ConstantBuffer {
                buffer: buffer.id(),
                offset,
                size,
            },
            memory: Some(buffer.memory().clone()),
        });
    }

    /// Memory range a constant-buffer slot points at.
    pub(crate) fn constant_buffer_source(&self, slot: u32) -> Option<(Arc<BufferMemory>, u64, u64)> {
        let slot = self.slots.get(slot as usize)?.as_ref()?;
        match (&slot.descriptor, &slot.memory) {
            (HeadlessDescriptor::ConstantBuffer { offset, size, .. }, Some(memory)) => {
                Some((memory.clone(), *offset, *size))
            }
            _ => None,
        }
    }
}

impl DescriptorHeap for HeadlessDescriptorHeap {
    fn desc(&self) -> DescriptorHeapDesc {
        self.desc
    }

    fn start_handle(&self) -> DescriptorHandle {
        DescriptorHandle::heap_start(self.id)
    }

    fn handle(&self, slot: u32) -> DescriptorHandle {
        self.slot_handle(slot)
    }

    fn is_occupied(&self, slot: u32) -> bool {
        self.descriptor(slot).is_some()
    }

    fn attachment(&self, slot: u32) -> Option<AttachmentView> {
        match self.descriptor(slot)? {
            HeadlessDescriptor::RenderTarget(view) | HeadlessDescriptor::DepthStencil(view) => {
                Some(*view)
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DescriptorHeapKind, SamplerDesc};

    fn sampler_heap(capacity: u32) -> HeadlessDescriptorHeap {
        HeadlessDescriptorHeap::new(
            7,
            DescriptorHeapDesc {
                kind: DescriptorHeapKind::Sampler,
                capacity,
                shader_visible: true,
            },
            32,
        )
    }

    #[test]
    fn test_slot_handles_do_not_overlap() {
        let heap = sampler_heap(4);
        let handles: Vec<_> = (0..4).map(|slot| heap.handle(slot)).collect();
        for pair in handles.windows(2) {
            assert_eq!(pair[1].ptr - pair[0].ptr, 32);
        }
        assert!(handles.iter().all(|h| h.heap_id() == 7));
    }

    #[test]
    fn test_write_and_reset() {
        let mut heap = sampler_heap(2);
        heap.write(1, HeadlessDescriptor::Sampler(SamplerDesc::point_clamp()));
        assert!(!heap.is_occupied(0));
        assert!(heap.is_occupied(1));
        assert_eq!(heap.occupied(), 1);
        assert!(heap.attachment(1).is_none());

        heap.reset();
        assert_eq!(heap.occupied(), 0);
    }
}
