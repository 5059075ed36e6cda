// SPDX-License-Identifier: CEPL-1.0
//! Render pass, descriptor-set layout, graphics pipeline and framebuffers.

use crate::error::VkResultExt;
use ash::util::read_spv;
use ash::vk;
use prism_core::{CancelToken, TaskError};
use prism_render::{FatalError, Vertex};
use std::io::Cursor;
use tracing::debug;

const VS_BUILTIN: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh.vert.spv"));
const FS_BUILTIN: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh.frag.spv"));

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// SPIR-V words for the vertex and fragment stages.
#[derive(Clone, Debug)]
pub struct ShaderSet {
    vertex: Vec<u32>,
    fragment: Vec<u32>,
}

impl ShaderSet {
    pub fn builtin() -> Result<Self, FatalError> {
        Self::from_spirv(VS_BUILTIN, FS_BUILTIN)
    }

    pub fn from_spirv(vertex: &[u8], fragment: &[u8]) -> Result<Self, FatalError> {
        let words = |stage: &str, bytes: &[u8]| {
            read_spv(&mut Cursor::new(bytes))
                .map_err(|e| FatalError::InvalidShader(format!("{stage}: {e}")))
        };
        Ok(Self {
            vertex: words("vertex", vertex)?,
            fragment: words("fragment", fragment)?,
        })
    }
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::POS_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::COLOR_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: Vertex::UV_OFFSET,
        },
    ]
}

pub fn render_pass_attachments(
    color: vk::Format,
    depth: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription {
            format: color,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ]
}

/// Color writes wait for the presentation engine to release the image.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub fn descriptor_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: SAMPLER_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

pub unsafe fn create_descriptor_set_layout(
    device: &ash::Device,
) -> Result<vk::DescriptorSetLayout, FatalError> {
    let bindings = descriptor_bindings();
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&ci, None)
        .vk_call("vkCreateDescriptorSetLayout")
}

pub unsafe fn create_render_pass(
    device: &ash::Device,
    color: vk::Format,
    depth: vk::Format,
) -> Result<vk::RenderPass, FatalError> {
    let attachments = render_pass_attachments(color, depth);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependency = external_dependency();

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&rp_info, None)
        .vk_call("vkCreateRenderPass")
}

/// What the pipeline is built against. Plain handles, safe to move to the
/// init thread.
#[derive(Clone, Copy, Debug)]
pub struct PipelineDesc {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    pub set_layout: vk::DescriptorSetLayout,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSet {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl PipelineSet {
    pub unsafe fn destroy_pipeline(&mut self, device: &ash::Device) {
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline, None);
            self.pipeline = vk::Pipeline::null();
        }
    }

    pub unsafe fn destroy_layout(&mut self, device: &ash::Device) {
        if self.layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.layout, None);
            self.layout = vk::PipelineLayout::null();
        }
    }

    pub unsafe fn destroy_render_pass(&mut self, device: &ash::Device) {
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.destroy_pipeline(device);
        self.destroy_layout(device);
        self.destroy_render_pass(device);
    }
}

unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
) -> Result<vk::ShaderModule, FatalError> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .map_err(|r| FatalError::InvalidShader(format!("vkCreateShaderModule: {r:?}")))
}

/// Builds render pass, layout and pipeline, checking `token` between steps.
/// Nothing is retained on failure or cancellation.
pub unsafe fn build_pipeline(
    device: &ash::Device,
    desc: &PipelineDesc,
    shaders: &ShaderSet,
    token: &CancelToken,
) -> Result<PipelineSet, TaskError<FatalError>> {
    let mut set = PipelineSet::default();
    let mut modules = [vk::ShaderModule::null(); 2];
    let result = build_into(device, desc, shaders, token, &mut set, &mut modules);
    for m in modules {
        if m != vk::ShaderModule::null() {
            device.destroy_shader_module(m, None);
        }
    }
    match result {
        Ok(()) => Ok(set),
        Err(e) => {
            set.destroy(device);
            if matches!(e, TaskError::Cancelled) {
                debug!(target: "prism::pipeline", "pipeline build cancelled, partial state released");
            }
            Err(e)
        }
    }
}

unsafe fn build_into(
    device: &ash::Device,
    desc: &PipelineDesc,
    shaders: &ShaderSet,
    token: &CancelToken,
    set: &mut PipelineSet,
    modules: &mut [vk::ShaderModule; 2],
) -> Result<(), TaskError<FatalError>> {
    token.checkpoint()?;
    set.render_pass = create_render_pass(device, desc.color_format, desc.depth_format)?;

    token.checkpoint()?;
    modules[0] = create_shader_module(device, &shaders.vertex)?;
    modules[1] = create_shader_module(device, &shaders.fragment)?;
    let entry = c"main";

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: modules[0],
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: modules[1],
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let vb = vertex_binding();
    let va = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };

    // Static viewport/scissor; the pipeline is rebuilt with the swapchain.
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: desc.extent.width as f32,
        height: desc.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: desc.extent,
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS,
        depth_bounds_test_enable: vk::FALSE,
        stencil_test_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &desc.set_layout,
        ..Default::default()
    };
    set.layout = device
        .create_pipeline_layout(&layout_info, None)
        .vk_call("vkCreatePipelineLayout")?;

    token.checkpoint()?;
    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        layout: set.layout,
        render_pass: set.render_pass,
        subpass: 0,
        ..Default::default()
    };
    let pipelines = match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(p) => p,
        Err((_, err)) => {
            return Err(FatalError::PipelineCreation(format!("{err:?}")).into());
        }
    };
    set.pipeline = pipelines[0];
    debug!(
        target: "prism::pipeline",
        width = desc.extent.width,
        height = desc.extent.height,
        "graphics pipeline created"
    );
    Ok(())
}

/// One framebuffer per swapchain view, all sharing the depth view.
pub unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    depth_view: vk::ImageView,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>, FatalError> {
    let mut framebuffers = Vec::with_capacity(views.len());
    for &view in views {
        let attachments = [view, depth_view];
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        match device
            .create_framebuffer(&fb_info, None)
            .vk_call("vkCreateFramebuffer")
        {
            Ok(fb) => framebuffers.push(fb),
            Err(e) => {
                for fb in framebuffers {
                    device.destroy_framebuffer(fb, None);
                }
                return Err(e);
            }
        }
    }
    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_input_matches_vertex_layout() {
        assert_eq!(vertex_binding().stride, 32);
        let offsets: Vec<u32> = vertex_attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        let locations: Vec<u32> = vertex_attributes().iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn attachments_clear_and_present() {
        let [color, depth] =
            render_pass_attachments(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn dependency_guards_color_output() {
        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(dep.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(dep.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn two_bindings_with_stage_visibility() {
        let [ubo, sampler] = descriptor_bindings();
        assert_eq!(ubo.binding, UNIFORM_BINDING);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(sampler.binding, SAMPLER_BINDING);
        assert_eq!(sampler.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn builtin_shaders_parse() {
        let set = ShaderSet::builtin().unwrap();
        assert_eq!(set.vertex[0], 0x0723_0203);
        assert_eq!(set.fragment[0], 0x0723_0203);
    }

    #[test]
    fn malformed_spirv_is_rejected() {
        assert!(matches!(
            ShaderSet::from_spirv(&[1, 2, 3], FS_BUILTIN),
            Err(FatalError::InvalidShader(_))
        ));
    }
}
