//! Append-only registries paired 1:1 with descriptor heap slots.
//!
//! Entry `i` of a registry always describes slot `i` of its heap. Entries
//! are never removed or reordered; a full registry rejects new entries
//! without touching the heap.

use std::sync::{Arc, Weak};

use gpuframe_rhi::{Backend, DescriptorHeapKind, SamplerDesc};

use crate::error::{RendererError, RendererResult};

#[derive(Debug)]
pub struct Registry<E> {
    heap: DescriptorHeapKind,
    capacity: u32,
    entries: Vec<E>,
}

impl<E> Registry<E> {
    pub fn new(heap: DescriptorHeapKind, capacity: u32) -> Self {
        Self {
            heap,
            capacity,
            entries: Vec::with_capacity(capacity as usize),
        }
    }

    /// The slot the next entry will occupy.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::CapacityExceeded`] when every slot is taken.
    pub fn next_slot(&self) -> RendererResult<u32> {
        let slot = self.entries.len() as u32;
        if slot >= self.capacity {
            return Err(RendererError::CapacityExceeded {
                heap: self.heap,
                capacity: self.capacity,
            });
        }
        Ok(slot)
    }

    /// Appends an entry once its descriptor has been written to `next_slot`.
    pub(crate) fn push(&mut self, entry: E) -> u32 {
        self.entries.push(entry);
        self.entries.len() as u32 - 1
    }

    pub fn get(&self, slot: u32) -> Option<&E> {
        self.entries.get(slot as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn heap_kind(&self) -> DescriptorHeapKind {
        self.heap
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Non-owning texture observations; callers keep textures alive.
pub type TextureRegistry<B> = Registry<Weak<<B as Backend>::Texture>>;

pub type SamplerRegistry = Registry<SamplerDesc>;

impl<T> Registry<Weak<T>> {
    /// The texture at `slot`, if it is still alive.
    pub fn resolve(&self, slot: u32) -> Option<Arc<T>> {
        self.get(slot).and_then(Weak::upgrade)
    }

    /// Entries whose texture has been dropped by its owner.
    pub fn dangling(&self) -> usize {
        self.iter().filter(|entry| entry.strong_count() == 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slots_follow_registration_order() {
        let mut registry = Registry::new(DescriptorHeapKind::Sampler, 2);
        assert_eq!(registry.next_slot().unwrap(), 0);
        assert_eq!(registry.push(SamplerDesc::point_clamp()), 0);
        assert_eq!(registry.next_slot().unwrap(), 1);
        assert_eq!(registry.push(SamplerDesc::default()), 1);
        assert_eq!(registry.get(0), Some(&SamplerDesc::point_clamp()));
    }

    #[test]
    fn test_full_registry_reports_capacity() {
        let mut registry = Registry::new(DescriptorHeapKind::ShaderResource, 1);
        registry.push(());
        match registry.next_slot() {
            Err(RendererError::CapacityExceeded { heap, capacity }) => {
                assert_eq!(heap, DescriptorHeapKind::ShaderResource);
                assert_eq!(capacity, 1);
            }
            other => panic!("expected CapacityExceeded, got {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_weak_entries_observe_drops() {
        let mut registry: Registry<Weak<u32>> = Registry::new(DescriptorHeapKind::ShaderResource, 4);
        let kept = Arc::new(1);
        let dropped = Arc::new(2);
        registry.push(Arc::downgrade(&kept));
        registry.push(Arc::downgrade(&dropped));
        drop(dropped);

        assert_eq!(registry.resolve(0).as_deref(), Some(&1));
        assert!(registry.resolve(1).is_none());
        assert_eq!(registry.dangling(), 1);
        assert_eq!(registry.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_registration_yields_distinct_slots(capacity in 1u32..64, attempts in 0u32..96) {
            let mut registry = Registry::new(DescriptorHeapKind::ShaderResource, capacity);
            let mut slots = Vec::new();
            for i in 0..attempts {
                match registry.next_slot() {
                    Ok(slot) => {
                        prop_assert_eq!(slot, i);
                        slots.push(registry.push(i));
                    }
                    Err(RendererError::CapacityExceeded { capacity: c, .. }) => {
                        prop_assert_eq!(c, capacity);
                        prop_assert!(i >= capacity);
                    }
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
            }
            prop_assert_eq!(slots.len() as u32, attempts.min(capacity));
            for (slot, value) in slots.iter().enumerate() {
                prop_assert_eq!(registry.get(slot as u32), Some(value));
            }
        }
    }
}
