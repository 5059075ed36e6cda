// SPDX-License-Identifier: CEPL-1.0
//! Every handle the renderer owns, and the order they are released in.

use crate::context::DeviceContext;
use crate::error::VkResultExt;
use crate::frame::{Semaphores, VkRecorder};
use crate::memory::OneShot;
use crate::pipeline::{self, PipelineDesc, PipelineSet, ShaderSet};
use crate::resources::ObjectResources;
use crate::swapchain::SwapchainState;
use crate::texture::Texture;
use ash::vk;
use prism_core::{CancelToken, TaskError};
use prism_render::{record_scene, ClearValues, FatalError, RenderSize, Teardown, TeardownStep};
use tracing::{debug, info};

pub struct GpuState {
    pub ctx: DeviceContext,
    pub depth_format: vk::Format,
    pub swapchain: SwapchainState,
    pub set_layout: vk::DescriptorSetLayout,
    pub pipeline: PipelineSet,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_pool: vk::CommandPool,
    pub transient_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub texture: Texture,
    pub objects: ObjectResources,
    pub semaphores: Semaphores,
    pub clear: ClearValues,
    pub shaders: ShaderSet,
}

impl GpuState {
    pub fn new(ctx: DeviceContext, depth_format: vk::Format, shaders: ShaderSet) -> Self {
        Self {
            ctx,
            depth_format,
            swapchain: SwapchainState::default(),
            set_layout: vk::DescriptorSetLayout::null(),
            pipeline: PipelineSet::default(),
            framebuffers: Vec::new(),
            command_pool: vk::CommandPool::null(),
            transient_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            texture: Texture::default(),
            objects: ObjectResources::default(),
            semaphores: Semaphores::default(),
            clear: ClearValues::default(),
            shaders,
        }
    }

    /// Graphics queue plus the transient pool.
    pub fn one_shot(&self) -> OneShot<'_> {
        OneShot {
            device: &self.ctx.device,
            queue: self.ctx.graphics_queue,
            pool: self.transient_pool,
        }
    }

    pub fn pipeline_desc(&self) -> PipelineDesc {
        PipelineDesc {
            color_format: self.swapchain.format.format,
            depth_format: self.depth_format,
            extent: self.swapchain.extent,
            set_layout: self.set_layout,
        }
    }

    /// Long-lived pool for the draw buffers, transient pool for uploads.
    pub unsafe fn create_command_pools(&mut self) -> Result<(), FatalError> {
        let d = &self.ctx.device;
        let draw_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: self.ctx.families.graphics,
            ..Default::default()
        };
        self.command_pool = d
            .create_command_pool(&draw_info, None)
            .vk_call("vkCreateCommandPool")?;

        let transient_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            queue_family_index: self.ctx.families.graphics,
            ..Default::default()
        };
        self.transient_pool = d
            .create_command_pool(&transient_info, None)
            .vk_call("vkCreateCommandPool")?;
        Ok(())
    }

    pub unsafe fn create_swapchain(&mut self, size: RenderSize) -> Result<(), FatalError> {
        self.swapchain =
            SwapchainState::create(&self.ctx, &self.one_shot(), size, self.depth_format)?;
        Ok(())
    }

    // STRICT ORDER (after a pipeline exists):
    // 1) framebuffers against the pipeline's render pass
    // 2) one command buffer per framebuffer
    // 3) record every buffer
    pub unsafe fn finish_swapchain_dependents(&mut self) -> Result<(), FatalError> {
        self.framebuffers = pipeline::create_framebuffers(
            &self.ctx.device,
            self.pipeline.render_pass,
            &self.swapchain.views,
            self.swapchain.depth.view,
            self.swapchain.extent,
        )?;

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: self.framebuffers.len() as u32,
            ..Default::default()
        };
        self.command_buffers = self
            .ctx
            .device
            .allocate_command_buffers(&alloc_info)
            .vk_call("vkAllocateCommandBuffers")?;

        self.record_commands()
    }

    /// Rebuilds everything released by a partial teardown. The pipeline is
    /// built inline; nothing else runs while the swapchain is being replaced.
    pub unsafe fn rebuild_swapchain(&mut self, size: RenderSize) -> Result<(), FatalError> {
        self.create_swapchain(size)?;
        let desc = self.pipeline_desc();
        let token = CancelToken::new();
        self.pipeline = match pipeline::build_pipeline(&self.ctx.device, &desc, &self.shaders, &token)
        {
            Ok(set) => set,
            Err(TaskError::Failed(e)) => return Err(e),
            Err(TaskError::Cancelled) => {
                return Err(FatalError::PipelineCreation("cancelled".to_owned()))
            }
        };
        self.finish_swapchain_dependents()?;
        info!(
            target: "prism::swapchain",
            width = self.swapchain.extent.width,
            height = self.swapchain.extent.height,
            images = self.swapchain.image_count(),
            "swapchain recreated"
        );
        Ok(())
    }

    /// Re-records every draw buffer. Buffers must not be in flight.
    pub unsafe fn record_commands(&mut self) -> Result<(), FatalError> {
        let mut draws = 0;
        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            let mut rec = VkRecorder {
                device: &self.ctx.device,
                cmd,
                render_pass: self.pipeline.render_pass,
                framebuffer,
                extent: self.swapchain.extent,
                pipeline: self.pipeline.pipeline,
                layout: self.pipeline.layout,
            };
            draws = record_scene(&mut rec, &self.objects.table, &self.clear)?;
        }
        debug!(
            target: "prism::frame",
            buffers = self.command_buffers.len(),
            draws_per_buffer = draws,
            "command buffers recorded"
        );
        Ok(())
    }

    unsafe fn free_command_buffers(&mut self) {
        if !self.command_buffers.is_empty() {
            self.ctx
                .device
                .free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers.clear();
        }
    }

    unsafe fn destroy_framebuffers(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.ctx.device.destroy_framebuffer(fb, None);
        }
    }

    unsafe fn destroy_command_pools(&mut self) {
        for pool in [&mut self.command_pool, &mut self.transient_pool] {
            if *pool != vk::CommandPool::null() {
                self.ctx.device.destroy_command_pool(*pool, None);
                *pool = vk::CommandPool::null();
            }
        }
    }
}

impl Teardown for GpuState {
    fn wait_idle(&mut self) -> Result<(), FatalError> {
        unsafe { self.ctx.wait_idle() }
    }

    fn destroy(&mut self, step: TeardownStep) {
        let d = &self.ctx.device;
        unsafe {
            match step {
                TeardownStep::DepthBuffer => self.swapchain.destroy_depth(d),
                TeardownStep::Framebuffers => self.destroy_framebuffers(),
                TeardownStep::CommandBuffers => self.free_command_buffers(),
                TeardownStep::Pipeline => self.pipeline.destroy_pipeline(d),
                TeardownStep::PipelineLayout => self.pipeline.destroy_layout(d),
                TeardownStep::RenderPass => self.pipeline.destroy_render_pass(d),
                TeardownStep::ImageViews => self.swapchain.destroy_views(d),
                TeardownStep::Swapchain => self.swapchain.destroy_swapchain(&self.ctx),
                TeardownStep::Texture => self.texture.destroy(d),
                TeardownStep::DescriptorPool => self.objects.destroy_pool(d),
                TeardownStep::DescriptorSetLayout => {
                    if self.set_layout != vk::DescriptorSetLayout::null() {
                        d.destroy_descriptor_set_layout(self.set_layout, None);
                        self.set_layout = vk::DescriptorSetLayout::null();
                    }
                }
                TeardownStep::ObjectBuffers => self.objects.destroy_buffers(d),
                TeardownStep::Semaphores => self.semaphores.destroy(d),
                TeardownStep::CommandPools => self.destroy_command_pools(),
                TeardownStep::Device => self.ctx.destroy_device(),
                TeardownStep::Surface => self.ctx.destroy_surface(),
                TeardownStep::DebugMessenger => self.ctx.destroy_debug_messenger(),
                TeardownStep::Instance => self.ctx.destroy_instance(),
            }
        }
    }
}
