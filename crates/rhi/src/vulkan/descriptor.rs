//! Descriptor heaps.
//!
//! A shader-visible heap is one descriptor set whose single binding is an
//! array of `capacity` descriptors; a slot is an array element. Render-target
//! and depth-stencil heaps have no Vulkan counterpart and hold image views on
//! the host instead.
//!
//! Root signatures build their set layouts with [`create_set_layout`] as well,
//! so a heap's set is always compatible with the table it is bound to.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use tracing::debug;

use super::convert;
use super::device::VulkanDevice;
use super::resources::{VulkanBuffer, VulkanTexture, create_image_view};
use super::swapchain::VulkanSwapChain;
use crate::backend::{Buffer as _, DescriptorHeap, SwapChain as _, Texture as _};
use crate::error::{RhiError, RhiResult};
use crate::types::{
    AttachmentView, DescriptorHandle, DescriptorHeapDesc, DescriptorHeapKind, Filter,
    SamplerDesc, TextureUsage,
};

/// How the set layout of one heap kind is declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SetLayoutSpec {
    pub descriptor_type: vk::DescriptorType,
    pub binding_flags: vk::DescriptorBindingFlags,
    pub layout_flags: vk::DescriptorSetLayoutCreateFlags,
    pub pool_flags: vk::DescriptorPoolCreateFlags,
}

/// Dynamic uniform buffers cannot be updated after bind; images and
/// samplers can, which lets registries fill slots while frames are in flight.
pub(crate) fn set_layout_spec(kind: DescriptorHeapKind) -> Option<SetLayoutSpec> {
    let descriptor_type = convert::descriptor_type(kind)?;
    Some(if descriptor_type == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC {
        SetLayoutSpec {
            descriptor_type,
            binding_flags: vk::DescriptorBindingFlags::PARTIALLY_BOUND,
            layout_flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            pool_flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    } else {
        SetLayoutSpec {
            descriptor_type,
            binding_flags: vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING,
            layout_flags: vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
            pool_flags: vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
        }
    })
}

/// Creates the set layout for a table of `count` descriptors of `kind`.
pub(crate) fn create_set_layout(
    device: &ash::Device,
    kind: DescriptorHeapKind,
    count: u32,
) -> RhiResult<vk::DescriptorSetLayout> {
    let spec = set_layout_spec(kind).ok_or_else(|| {
        RhiError::InvalidArgument(format!("{} heaps cannot be bound to shaders", kind))
    })?;

    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(spec.descriptor_type)
        .descriptor_count(count)
        .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)];
    let binding_flags = [spec.binding_flags];
    let mut flags_info =
        vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
    let create_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(spec.layout_flags)
        .bindings(&bindings)
        .push_next(&mut flags_info);

    // SAFETY: the create info references locals that outlive the call.
    let layout = unsafe { device.create_descriptor_set_layout(&create_info, None)? };
    Ok(layout)
}

struct ShaderVisibleSet {
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
}

/// What a slot holds. Views and samplers are owned by the heap.
enum Slot {
    ConstantBuffer,
    ShaderResource(vk::ImageView),
    Sampler(vk::Sampler),
    Attachment(AttachmentView),
}

pub struct VulkanDescriptorHeap {
    device: Arc<VulkanDevice>,
    id: u32,
    desc: DescriptorHeapDesc,
    increment: u32,
    shader_set: Option<ShaderVisibleSet>,
    slots: Vec<Option<Slot>>,
}

impl VulkanDescriptorHeap {
    pub(crate) fn new(
        device: Arc<VulkanDevice>,
        id: u32,
        desc: DescriptorHeapDesc,
        increment: u32,
    ) -> RhiResult<Self> {
        let shader_set = match set_layout_spec(desc.kind) {
            Some(spec) => Some(create_shader_visible_set(&device, desc, spec)?),
            None => None,
        };
        debug!(
            "Created {} descriptor heap {} with {} slot(s)",
            desc.kind, id, desc.capacity
        );
        Ok(Self {
            device,
            id,
            desc,
            increment,
            shader_set,
            slots: (0..desc.capacity).map(|_| None).collect(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The set bound for this heap's table, if its kind is shader visible.
    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.shader_set.as_ref().map(|s| s.set)
    }

    fn check(&self, kind: DescriptorHeapKind, slot: u32) -> RhiResult<()> {
        if self.desc.kind != kind {
            return Err(RhiError::InvalidArgument(format!(
                "cannot write a {} descriptor into a {} heap",
                kind, self.desc.kind
            )));
        }
        if slot >= self.desc.capacity {
            return Err(RhiError::InvalidArgument(format!(
                "slot {} out of range for {} heap of capacity {}",
                slot, self.desc.kind, self.desc.capacity
            )));
        }
        Ok(())
    }

    fn set(&self) -> RhiResult<vk::DescriptorSet> {
        self.descriptor_set().ok_or_else(|| {
            RhiError::Internal(format!("{} heap {} has no descriptor set", self.desc.kind, self.id))
        })
    }

    fn store(&mut self, slot: u32, content: Slot) {
        if let Some(old) = self.slots[slot as usize].replace(content) {
            self.release(old);
        }
    }

    fn release(&self, slot: Slot) {
        let device = self.device.handle();
        // SAFETY: slots are only overwritten or released once the GPU no longer
        // reads them.
        unsafe {
            match slot {
                Slot::ConstantBuffer => {}
                Slot::ShaderResource(view) => device.destroy_image_view(view, None),
                Slot::Sampler(sampler) => device.destroy_sampler(sampler, None),
                Slot::Attachment(view) => {
                    device.destroy_image_view(vk::ImageView::from_raw(view.view), None)
                }
            }
        }
    }

    fn write_image(
        &self,
        slot: u32,
        descriptor_type: vk::DescriptorType,
        image_info: vk::DescriptorImageInfo,
    ) -> RhiResult<()> {
        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set()?)
            .dst_binding(0)
            .dst_array_element(slot)
            .descriptor_type(descriptor_type)
            .image_info(&image_infos);
        // SAFETY: the write targets a live set within its declared array.
        unsafe { self.device.handle().update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    pub(crate) fn write_constant_buffer(
        &mut self,
        slot: u32,
        buffer: &VulkanBuffer,
        offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        self.check(DescriptorHeapKind::ConstantBuffer, slot)?;
        if offset.saturating_add(size) > buffer.desc().size {
            return Err(RhiError::InvalidArgument(format!(
                "constant buffer view {}..{} exceeds buffer size {}",
                offset,
                offset.saturating_add(size),
                buffer.desc().size
            )));
        }

        let buffer_infos = [vk::DescriptorBufferInfo {
            buffer: buffer.handle(),
            offset,
            range: size,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set()?)
            .dst_binding(0)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&buffer_infos);
        // SAFETY: the write targets a live set within its declared array.
        unsafe { self.device.handle().update_descriptor_sets(&[write], &[]) };

        self.store(slot, Slot::ConstantBuffer);
        Ok(())
    }

    pub(crate) fn write_shader_resource(
        &mut self,
        slot: u32,
        texture: &VulkanTexture,
    ) -> RhiResult<()> {
        self.check(DescriptorHeapKind::ShaderResource, slot)?;
        let desc = texture.desc();
        if desc.usage != TextureUsage::Sampled {
            return Err(RhiError::InvalidArgument(
                "shader resource views need a sampled texture".to_string(),
            ));
        }

        let view = create_image_view(self.device.handle(), texture.handle(), desc.format, desc.mip_levels)?;
        let written = self.write_image(
            slot,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        );
        if let Err(e) = written {
            self.release(Slot::ShaderResource(view));
            return Err(e);
        }
        self.store(slot, Slot::ShaderResource(view));
        Ok(())
    }

    pub(crate) fn write_sampler(&mut self, slot: u32, desc: &SamplerDesc) -> RhiResult<()> {
        self.check(DescriptorHeapKind::Sampler, slot)?;

        let (filter, mipmap_mode) = convert::filter(desc.filter);
        let address_mode = convert::address_mode(desc.address_mode);
        let anisotropy = desc.filter == Filter::Anisotropic
            && self.device.physical().features.sampler_anisotropy == vk::TRUE;
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(desc.max_anisotropy as f32)
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod.min(vk::LOD_CLAMP_NONE))
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK);

        // SAFETY: valid device and create info.
        let sampler = unsafe { self.device.handle().create_sampler(&create_info, None)? };
        let written = self.write_image(
            slot,
            vk::DescriptorType::SAMPLER,
            vk::DescriptorImageInfo {
                sampler,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            },
        );
        if let Err(e) = written {
            self.release(Slot::Sampler(sampler));
            return Err(e);
        }
        self.store(slot, Slot::Sampler(sampler));
        Ok(())
    }

    pub(crate) fn write_depth_stencil(&mut self, slot: u32, texture: &VulkanTexture) -> RhiResult<()> {
        self.check(DescriptorHeapKind::DepthStencil, slot)?;
        let desc = texture.desc();
        if desc.usage != TextureUsage::DepthStencil || !desc.format.is_depth() {
            return Err(RhiError::InvalidArgument(
                "depth-stencil views need a depth texture".to_string(),
            ));
        }

        let view = create_image_view(self.device.handle(), texture.handle(), desc.format, 1)?;
        let attachment = AttachmentView {
            handle: self.handle(slot),
            view: view.as_raw(),
            image: texture.image(),
            extent: desc.extent,
        };
        self.store(slot, Slot::Attachment(attachment));
        Ok(())
    }

    pub(crate) fn write_render_target(
        &mut self,
        slot: u32,
        swap_chain: &VulkanSwapChain,
        buffer_index: u32,
    ) -> RhiResult<()> {
        self.check(DescriptorHeapKind::RenderTarget, slot)?;
        let image = swap_chain.back_buffer(buffer_index)?;

        let view = create_image_view(
            self.device.handle(),
            vk::Image::from_raw(image.raw),
            image.format,
            1,
        )?;
        let attachment = AttachmentView {
            handle: self.handle(slot),
            view: view.as_raw(),
            image,
            extent: swap_chain.desc().extent,
        };
        self.store(slot, Slot::Attachment(attachment));
        Ok(())
    }
}

fn create_shader_visible_set(
    device: &VulkanDevice,
    desc: DescriptorHeapDesc,
    spec: SetLayoutSpec,
) -> RhiResult<ShaderVisibleSet> {
    let raw = device.handle();
    let layout = create_set_layout(raw, desc.kind, desc.capacity)?;

    let pool_sizes = [vk::DescriptorPoolSize {
        ty: spec.descriptor_type,
        descriptor_count: desc.capacity,
    }];
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .flags(spec.pool_flags)
        .max_sets(1)
        .pool_sizes(&pool_sizes);

    // SAFETY: valid device and create info.
    let pool = match unsafe { raw.create_descriptor_pool(&pool_info, None) } {
        Ok(pool) => pool,
        Err(e) => {
            // SAFETY: the layout is unused.
            unsafe { raw.destroy_descriptor_set_layout(layout, None) };
            return Err(e.into());
        }
    };

    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    // SAFETY: the pool has room for exactly this set.
    match unsafe { raw.allocate_descriptor_sets(&alloc_info) } {
        Ok(sets) => Ok(ShaderVisibleSet {
            pool,
            layout,
            set: sets[0],
        }),
        Err(e) => {
            // SAFETY: neither object is in use.
            unsafe {
                raw.destroy_descriptor_pool(pool, None);
                raw.destroy_descriptor_set_layout(layout, None);
            }
            Err(e.into())
        }
    }
}

impl DescriptorHeap for VulkanDescriptorHeap {
    fn desc(&self) -> DescriptorHeapDesc {
        self.desc
    }

    fn start_handle(&self) -> DescriptorHandle {
        DescriptorHandle::heap_start(self.id)
    }

    fn handle(&self, slot: u32) -> DescriptorHandle {
        self.start_handle().offset(slot, self.increment)
    }

    fn is_occupied(&self, slot: u32) -> bool {
        self.slots
            .get(slot as usize)
            .is_some_and(|slot| slot.is_some())
    }

    fn attachment(&self, slot: u32) -> Option<AttachmentView> {
        match self.slots.get(slot as usize)?.as_ref()? {
            Slot::Attachment(view) => Some(*view),
            _ => None,
        }
    }

    fn reset(&mut self) {
        let slots: Vec<Slot> = self.slots.iter_mut().filter_map(Option::take).collect();
        for slot in slots {
            self.release(slot);
        }
    }
}

impl Drop for VulkanDescriptorHeap {
    fn drop(&mut self) {
        self.reset();
        if let Some(set) = self.shader_set.take() {
            let device = self.device.handle();
            // SAFETY: destroying the pool frees its set; owners flush the queue first.
            unsafe {
                device.destroy_descriptor_pool(set.pool, None);
                device.destroy_descriptor_set_layout(set.layout, None);
            }
        }
    }
}
