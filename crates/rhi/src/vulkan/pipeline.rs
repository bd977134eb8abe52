//! Shader modules, root signatures as pipeline layouts, and graphics
//! pipelines for dynamic rendering.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use super::convert;
use super::descriptor::create_set_layout;
use super::device::VulkanDevice;
use crate::error::{RhiError, RhiResult};
use crate::shader::ParsedShader;
use crate::types::{
    DescriptorHeapKind, InputLayout, PipelineStateDesc, RootParameter, RootSignatureDesc,
    ShaderSource, ShaderStage,
};

pub struct VulkanShader {
    device: Arc<VulkanDevice>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl VulkanShader {
    pub(crate) fn new(
        device: Arc<VulkanDevice>,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> RhiResult<Self> {
        let parsed = ParsedShader::parse(stage, source)?;
        let words = parsed.to_spirv()?;
        let entry_point = CString::new(parsed.entry_point())
            .map_err(|_| RhiError::ShaderError("entry point contains NUL".to_string()))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        // SAFETY: `words` is validated SPIR-V.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!(
            "Created {} shader module '{}' ({} words)",
            stage,
            parsed.entry_point(),
            words.len()
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        let stage = match self.stage {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Pixel => vk::ShaderStageFlags::FRAGMENT,
        };
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage)
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        // SAFETY: modules are only needed during pipeline creation.
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

/// One descriptor set per root parameter, in parameter order.
pub struct VulkanRootSignature {
    device: Arc<VulkanDevice>,
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    desc: RootSignatureDesc,
}

/// The heap kind and array length of the set backing a root parameter.
pub(crate) fn parameter_table(parameter: &RootParameter) -> (DescriptorHeapKind, u32) {
    match *parameter {
        RootParameter::ConstantBuffer { heap_capacity } => {
            (DescriptorHeapKind::ConstantBuffer, heap_capacity)
        }
        RootParameter::DescriptorTable { kind, count } => (kind, count),
    }
}

impl VulkanRootSignature {
    pub(crate) fn new(device: Arc<VulkanDevice>, desc: &RootSignatureDesc) -> RhiResult<Self> {
        let raw = device.handle();
        let mut set_layouts = Vec::with_capacity(desc.parameters.len());
        for parameter in &desc.parameters {
            let (kind, count) = parameter_table(parameter);
            match create_set_layout(raw, kind, count) {
                Ok(layout) => set_layouts.push(layout),
                Err(e) => {
                    destroy_set_layouts(raw, &set_layouts);
                    return Err(e);
                }
            }
        }

        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        // SAFETY: every set layout is live.
        let layout = match unsafe { raw.create_pipeline_layout(&create_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                destroy_set_layouts(raw, &set_layouts);
                return Err(e.into());
            }
        };

        debug!(
            "Created root signature with {} parameter(s)",
            desc.parameters.len()
        );

        Ok(Self {
            device,
            layout,
            set_layouts,
            desc: desc.clone(),
        })
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn desc(&self) -> &RootSignatureDesc {
        &self.desc
    }
}

fn destroy_set_layouts(device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) {
    for &layout in layouts {
        // SAFETY: the layouts are owned by a root signature being torn down.
        unsafe { device.destroy_descriptor_set_layout(layout, None) };
    }
}

impl Drop for VulkanRootSignature {
    fn drop(&mut self) {
        let raw = self.device.handle();
        // SAFETY: owners flush the queue before dropping the root signature.
        unsafe { raw.destroy_pipeline_layout(self.layout, None) };
        destroy_set_layouts(raw, &self.set_layouts);
    }
}

pub struct VulkanPipelineState {
    device: Arc<VulkanDevice>,
    pipeline: vk::Pipeline,
}

fn vertex_input(
    layout: &InputLayout,
) -> (
    vk::VertexInputBindingDescription,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: layout.stride,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes = layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: 0,
            format: convert::vertex_format(attribute.format),
            offset: attribute.offset,
        })
        .collect();
    (binding, attributes)
}

impl VulkanPipelineState {
    pub(crate) fn new(
        device: Arc<VulkanDevice>,
        root_signature: &VulkanRootSignature,
        vertex_shader: &VulkanShader,
        pixel_shader: &VulkanShader,
        desc: &PipelineStateDesc,
    ) -> RhiResult<Self> {
        if vertex_shader.stage() != ShaderStage::Vertex || pixel_shader.stage() != ShaderStage::Pixel
        {
            return Err(RhiError::PipelineError(
                "pipeline needs a vertex and a pixel shader".to_string(),
            ));
        }
        if !desc.depth_format.is_depth() {
            return Err(RhiError::PipelineError(format!(
                "{:?} is not a depth format",
                desc.depth_format
            )));
        }

        let stages = [vertex_shader.stage_info(), pixel_shader.stage_info()];

        let (binding, attributes) = vertex_input(&desc.input_layout);
        let bindings = [binding];
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(convert::cull_mode(desc.cull_mode))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [convert::format(desc.render_target_format)];
        let depth_format = convert::format(desc.depth_format);
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format);
        if desc.depth_format.has_stencil() {
            rendering_info = rendering_info.stencil_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(root_signature.layout())
            .push_next(&mut rendering_info);

        // SAFETY: every state struct outlives the call.
        let pipelines = unsafe {
            device.handle().create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, e)| RhiError::from(e))?;
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created ({:?} color, {:?} depth)",
            desc.render_target_format, desc.depth_format
        );

        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for VulkanPipelineState {
    fn drop(&mut self) {
        // SAFETY: owners flush the queue before dropping the pipeline.
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VertexAttribute, VertexFormat};

    #[test]
    fn test_parameter_table_for_constant_buffer() {
        assert_eq!(
            parameter_table(&RootParameter::ConstantBuffer { heap_capacity: 1 }),
            (DescriptorHeapKind::ConstantBuffer, 1)
        );
        assert_eq!(
            parameter_table(&RootParameter::DescriptorTable {
                kind: DescriptorHeapKind::Sampler,
                count: 16,
            }),
            (DescriptorHeapKind::Sampler, 16)
        );
    }

    #[test]
    fn test_vertex_input_uses_one_binding() {
        let layout = InputLayout {
            stride: 20,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x2,
                    offset: 12,
                },
            ],
        };
        let (binding, attributes) = vertex_input(&layout);
        assert_eq!(binding.stride, 20);
        assert_eq!(attributes.len(), 2);
        assert!(attributes.iter().all(|a| a.binding == 0));
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }
}
