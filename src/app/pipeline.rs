use super::error::RenderError;

use anyhow::{anyhow, Result};
use vulkanalia::bytecode::Bytecode;
use vulkanalia::prelude::v1_0::*;

/// Component type of one vertex attribute. Attributes are packed contiguously
/// in declaration order into a single per-vertex binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexAttribute {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
}

impl VertexAttribute {
    pub const fn components(self) -> u32 {
        match self {
            Self::Float | Self::Int => 1,
            Self::Float2 | Self::Int2 => 2,
            Self::Float3 | Self::Int3 => 3,
            Self::Float4 | Self::Int4 => 4,
        }
    }

    pub const fn size(self) -> u32 {
        // All supported component types are 4 bytes wide.
        4 * self.components()
    }

    pub const fn format(self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::Float3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::Int => vk::Format::R32_SINT,
            Self::Int2 => vk::Format::R32G32_SINT,
            Self::Int3 => vk::Format::R32G32B32_SINT,
            Self::Int4 => vk::Format::R32G32B32A32_SINT,
        }
    }
}

/// The fixed vertex layout of the one pipeline this harness builds:
/// position (vec2), color (vec3), texture coordinates (vec2).
pub const VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute::Float2,
    VertexAttribute::Float3,
    VertexAttribute::Float2,
];

pub fn binding_description(attributes: &[VertexAttribute]) -> vk::VertexInputBindingDescription {
    let stride = attributes.iter().map(|a| a.size()).sum();
    vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(stride)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build()
}

pub fn attribute_descriptions(
    attributes: &[VertexAttribute],
) -> Vec<vk::VertexInputAttributeDescription> {
    let mut offset = 0;
    attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| {
            let description = vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(location as u32)
                .format(attribute.format())
                .offset(offset)
                .build();
            offset += attribute.size();
            description
        })
        .collect()
}

/// The compiled rendering configuration. Immutable after creation; rebuilt
/// only if the surface color format itself changes.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    /// The attachment format this pipeline was compiled against. Rendering
    /// into a swapchain of any other format is invalid.
    pub color_format: vk::Format,
}

impl Pipeline {
    pub unsafe fn create(
        device: &Device,
        color_format: vk::Format,
        vert_spv: &[u8],
        frag_spv: &[u8],
    ) -> Result<Self> {
        let vert_module = create_shader_module(device, vert_spv)?;
        let frag_module = match create_shader_module(device, frag_spv) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module, None);
                return Err(e);
            }
        };

        let result = build(device, color_format, vert_module, frag_module);

        device.destroy_shader_module(frag_module, None);
        device.destroy_shader_module(vert_module, None);

        result
    }

    /// Releases pipeline, layout and descriptor-set layout, in that order.
    pub unsafe fn destroy(&self, device: &Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
    }
}

unsafe fn create_shader_module(device: &Device, bytecode: &[u8]) -> Result<vk::ShaderModule> {
    let bytecode = Bytecode::new(bytecode)
        .map_err(|_| anyhow!(RenderError::Initialization("Invalid shader bytecode.".into())))?;

    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.code_size())
        .code(bytecode.code());

    Ok(device.create_shader_module(&info, None)?)
}

unsafe fn build(
    device: &Device,
    color_format: vk::Format,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
) -> Result<Pipeline> {
    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_module)
        .name(b"main\0");

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_module)
        .name(b"main\0");

    let binding_descriptions = &[binding_description(&VERTEX_ATTRIBUTES)];
    let attributes = attribute_descriptions(&VERTEX_ATTRIBUTES);
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(binding_descriptions)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // One viewport and one scissor, both supplied per frame.
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::_1);

    let attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::all())
        .blend_enable(false);

    let attachments = &[attachment];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(attachments);

    let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

    let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX);

    let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(1)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT);

    let bindings = &[ubo_binding, sampler_binding];
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

    let descriptor_set_layout = device
        .create_descriptor_set_layout(&layout_info, None)
        .map_err(|e| {
            anyhow!(RenderError::Initialization(format!(
                "Descriptor set layout creation failed: {e}"
            )))
        })?;

    let set_layouts = &[descriptor_set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);

    let layout = match device.create_pipeline_layout(&layout_info, None) {
        Ok(layout) => layout,
        Err(e) => {
            device.destroy_descriptor_set_layout(descriptor_set_layout, None);
            return Err(anyhow!(RenderError::Initialization(format!(
                "Pipeline layout creation failed: {e}"
            ))));
        }
    };

    // No render pass object; the pipeline targets the surface format
    // directly through the dynamic rendering attachment description.
    let color_formats = &[color_format];
    let mut rendering_info =
        vk::PipelineRenderingCreateInfo::builder().color_attachment_formats(color_formats);

    let stages = &[vert_stage, frag_stage];
    let info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipeline = match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        &[info],
        None,
    ) {
        Ok(pipelines) => pipelines.0[0],
        Err(e) => {
            device.destroy_pipeline_layout(layout, None);
            device.destroy_descriptor_set_layout(descriptor_set_layout, None);
            return Err(anyhow!(RenderError::Initialization(format!(
                "Graphics pipeline creation failed: {e}"
            ))));
        }
    };

    Ok(Pipeline {
        pipeline,
        layout,
        descriptor_set_layout,
        color_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_packed_in_declaration_order() {
        let descriptions = attribute_descriptions(&VERTEX_ATTRIBUTES);
        assert_eq!(descriptions.len(), 3);

        assert_eq!(descriptions[0].location, 0);
        assert_eq!(descriptions[0].offset, 0);
        assert_eq!(descriptions[0].format, vk::Format::R32G32_SFLOAT);

        assert_eq!(descriptions[1].location, 1);
        assert_eq!(descriptions[1].offset, 8);
        assert_eq!(descriptions[1].format, vk::Format::R32G32B32_SFLOAT);

        assert_eq!(descriptions[2].location, 2);
        assert_eq!(descriptions[2].offset, 20);
        assert_eq!(descriptions[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn binding_stride_covers_all_attributes() {
        let binding = binding_description(&VERTEX_ATTRIBUTES);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attribute_sizes_follow_component_counts() {
        assert_eq!(VertexAttribute::Float.size(), 4);
        assert_eq!(VertexAttribute::Float4.size(), 16);
        assert_eq!(VertexAttribute::Int3.size(), 12);
        assert_eq!(VertexAttribute::Int2.format(), vk::Format::R32G32_SINT);
    }
}
