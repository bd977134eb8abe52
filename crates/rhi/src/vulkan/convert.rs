//! Conversions from backend-neutral types to Vulkan enums and flags.

use ash::vk;

use crate::types::{
    AddressMode, BufferUsage, CullMode, DescriptorHeapKind, Filter, Format, IndexFormat,
    ResourceState, TextureUsage, VertexFormat,
};

pub(crate) fn format(format: Format) -> vk::Format {
    match format {
        Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        Format::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Inverse of [`format`] for formats a surface may report.
pub(crate) fn format_from_vk(format: vk::Format) -> Option<Format> {
    Some(match format {
        vk::Format::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::Bgra8UnormSrgb,
        vk::Format::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::Rgba8UnormSrgb,
        vk::Format::R16G16B16A16_SFLOAT => Format::Rgba16Float,
        _ => return None,
    })
}

pub(crate) fn aspect_mask(format: Format) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Layout a depth attachment is rendered in.
pub(crate) fn depth_attachment_layout(format: Format) -> vk::ImageLayout {
    if format.has_stencil() {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
    }
}

/// Layout, pipeline stages and access of an image in `state`.
///
/// `Common` and `Present` as a source discard contents: back buffers are
/// cleared every frame and nothing reads an image in the common state.
pub(crate) fn barrier_scope(
    state: ResourceState,
    format: Format,
    as_source: bool,
) -> (vk::ImageLayout, vk::PipelineStageFlags2, vk::AccessFlags2) {
    match state {
        ResourceState::Common if as_source => (
            vk::ImageLayout::UNDEFINED,
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::NONE,
        ),
        ResourceState::Common => (
            vk::ImageLayout::GENERAL,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
        ResourceState::Present if as_source => (
            vk::ImageLayout::UNDEFINED,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::NONE,
        ),
        ResourceState::Present => (
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            vk::AccessFlags2::NONE,
        ),
        ResourceState::RenderTarget => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        ResourceState::DepthWrite => (
            depth_attachment_layout(format),
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ResourceState::ShaderResource => (
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        ResourceState::CopyDest => (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::ALL_TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
    }
}

pub(crate) fn descriptor_type(kind: DescriptorHeapKind) -> Option<vk::DescriptorType> {
    match kind {
        DescriptorHeapKind::ConstantBuffer => Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
        DescriptorHeapKind::ShaderResource => Some(vk::DescriptorType::SAMPLED_IMAGE),
        DescriptorHeapKind::Sampler => Some(vk::DescriptorType::SAMPLER),
        DescriptorHeapKind::RenderTarget | DescriptorHeapKind::DepthStencil => None,
    }
}

pub(crate) fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
    }
}

pub(crate) fn texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    match usage {
        TextureUsage::Sampled => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        TextureUsage::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    }
}

pub(crate) fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

pub(crate) fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn filter(filter: Filter) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter {
        Filter::Point => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        Filter::Linear | Filter::Anisotropic => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
    }
}

pub(crate) fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_formats_round_trip() {
        for f in [
            Format::Bgra8Unorm,
            Format::Bgra8UnormSrgb,
            Format::Rgba8Unorm,
            Format::Rgba8UnormSrgb,
            Format::Rgba16Float,
        ] {
            assert_eq!(format_from_vk(format(f)), Some(f));
        }
        assert_eq!(format_from_vk(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn test_aspect_mask() {
        assert_eq!(aspect_mask(Format::Bgra8Unorm), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(Format::D32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(Format::D24UnormS8Uint),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_present_as_source_discards() {
        let (layout, _, _) = barrier_scope(ResourceState::Present, Format::Bgra8Unorm, true);
        assert_eq!(layout, vk::ImageLayout::UNDEFINED);
        let (layout, _, _) = barrier_scope(ResourceState::Present, Format::Bgra8Unorm, false);
        assert_eq!(layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_depth_layout_matches_attachment_layout() {
        for f in [Format::D32Float, Format::D24UnormS8Uint] {
            let (layout, _, _) = barrier_scope(ResourceState::DepthWrite, f, false);
            assert_eq!(layout, depth_attachment_layout(f));
        }
    }

    #[test]
    fn test_attachment_heaps_have_no_descriptor_type() {
        assert_eq!(descriptor_type(DescriptorHeapKind::RenderTarget), None);
        assert_eq!(descriptor_type(DescriptorHeapKind::DepthStencil), None);
        assert_eq!(
            descriptor_type(DescriptorHeapKind::ConstantBuffer),
            Some(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
        );
    }
}
