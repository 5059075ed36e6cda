// SPDX-License-Identifier: CEPL-1.0
//! Prerecorded draw command buffers and the per-frame acquire/submit/present
//! calls behind [`FrameBackend`].

use crate::error::{api_error, VkResultExt};
use crate::gpu::GpuState;
use crate::resources::ObjectGpu;
use ash::vk;
use prism_render::{
    ClearValues, CommandRecorder, DisposalSequencer, FatalError, FrameBackend, ObjectId,
    RenderError, RenderSize, UniformPayload,
};
use tracing::{debug, trace};

pub fn clear_values(clear: &ClearValues) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear.color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: clear.depth,
                stencil: 0,
            },
        },
    ]
}

/// Records one image's command buffer.
pub struct VkRecorder<'a> {
    pub device: &'a ash::Device,
    pub cmd: vk::CommandBuffer,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl CommandRecorder for VkRecorder<'_> {
    type Entry = ObjectGpu;

    fn begin_pass(&mut self, clear: &ClearValues) -> Result<(), FatalError> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        let clears = clear_values(clear);
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass,
            framebuffer: self.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .begin_command_buffer(self.cmd, &begin)
                .vk_call("vkBeginCommandBuffer")?;
            self.device
                .cmd_begin_render_pass(self.cmd, &rp_begin, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }

    fn bind_vertex_buffer(&mut self, entry: &ObjectGpu) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[entry.vertex.buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, entry: &ObjectGpu) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, entry.index.buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn bind_descriptor_set(&mut self, entry: &ObjectGpu) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                0,
                &[entry.set],
                &[],
            );
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device.cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0);
        }
    }

    fn end_pass(&mut self) -> Result<(), FatalError> {
        unsafe {
            self.device.cmd_end_render_pass(self.cmd);
            self.device
                .end_command_buffer(self.cmd)
                .vk_call("vkEndCommandBuffer")
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Semaphores {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl Semaphores {
    pub unsafe fn new(device: &ash::Device) -> Result<Self, FatalError> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let image_available = device
            .create_semaphore(&ci, None)
            .vk_call("vkCreateSemaphore")?;
        let render_finished = match device.create_semaphore(&ci, None) {
            Ok(s) => s,
            Err(r) => {
                device.destroy_semaphore(image_available, None);
                return Err(api_error("vkCreateSemaphore", r));
            }
        };
        Ok(Self {
            image_available,
            render_finished,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for s in [&mut self.image_available, &mut self.render_finished] {
            if *s != vk::Semaphore::null() {
                device.destroy_semaphore(*s, None);
                *s = vk::Semaphore::null();
            }
        }
    }
}

/// Maps the presentation engine's staleness codes onto [`RenderError`].
pub fn classify_present(call: &'static str, result: Result<bool, vk::Result>) -> Result<(), RenderError> {
    match result {
        Ok(false) => Ok(()),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainStale),
        Err(r) => Err(api_error(call, r).into()),
    }
}

/// Acquire tolerates suboptimal; present reports it.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> Result<u32, RenderError> {
    match result {
        Ok((index, _suboptimal)) => Ok(index),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainStale),
        Err(r) => Err(api_error("vkAcquireNextImageKHR", r).into()),
    }
}

/// Borrowed view of the renderer handed to the frame executor.
pub struct FrameContext<'a> {
    pub gpu: &'a mut GpuState,
    pub sequencer: &'a DisposalSequencer,
}

impl FrameBackend for FrameContext<'_> {
    fn extent(&self) -> RenderSize {
        self.gpu.swapchain.render_size()
    }

    fn write_uniform(
        &mut self,
        id: ObjectId,
        payload: &UniformPayload,
    ) -> Result<bool, FatalError> {
        unsafe { self.gpu.objects.write_uniform(&self.gpu.ctx.device, id, payload) }
    }

    fn acquire_image(&mut self) -> Result<u32, RenderError> {
        let gpu = &*self.gpu;
        let result = unsafe {
            gpu.ctx.swapchain_loader.acquire_next_image(
                gpu.swapchain.swapchain,
                u64::MAX,
                gpu.semaphores.image_available,
                vk::Fence::null(),
            )
        };
        let index = classify_acquire(result)?;
        trace!(target: "prism::frame", index, "acquired");
        Ok(index)
    }

    fn submit(&mut self, image_index: u32) -> Result<(), FatalError> {
        let gpu = &*self.gpu;
        let cmd = gpu.command_buffers[image_index as usize];
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &gpu.semaphores.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &gpu.semaphores.render_finished,
            ..Default::default()
        };
        unsafe {
            gpu.ctx
                .device
                .queue_submit(
                    gpu.ctx.graphics_queue,
                    std::slice::from_ref(&submit),
                    vk::Fence::null(),
                )
                .vk_call("vkQueueSubmit")
        }
    }

    fn present(&mut self, image_index: u32) -> Result<(), RenderError> {
        let gpu = &*self.gpu;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &gpu.semaphores.render_finished,
            swapchain_count: 1,
            p_swapchains: &gpu.swapchain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let result = unsafe {
            gpu.ctx
                .swapchain_loader
                .queue_present(gpu.ctx.present_queue, &present)
        };
        classify_present("vkQueuePresentKHR", result)?;
        // One frame in flight: the next uniform writes must not race this one.
        unsafe {
            gpu.ctx
                .device
                .queue_wait_idle(gpu.ctx.present_queue)
                .vk_call("vkQueueWaitIdle")?;
        }
        Ok(())
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<(), FatalError> {
        debug!(target: "prism::frame", width = size.width, height = size.height, "recreating swapchain");
        self.sequencer.release_swapchain(&mut *self.gpu)?;
        unsafe { self.gpu.rebuild_swapchain(size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_values_carry_color_and_depth() {
        let clear = ClearValues {
            color: [0.1, 0.2, 0.3, 1.0],
            depth: 1.0,
        };
        let [color, depth] = clear_values(&clear);
        unsafe {
            assert_eq!(color.color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn acquire_out_of_date_is_stale() {
        assert_eq!(classify_acquire(Ok((2, false))).unwrap(), 2);
        assert_eq!(classify_acquire(Ok((1, true))).unwrap(), 1);
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(RenderError::SwapchainStale)
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RenderError::Fatal(FatalError::Api { call: "vkAcquireNextImageKHR", .. }))
        ));
    }

    #[test]
    fn present_suboptimal_or_out_of_date_is_stale() {
        assert!(classify_present("present", Ok(false)).is_ok());
        assert!(matches!(
            classify_present("present", Ok(true)),
            Err(RenderError::SwapchainStale)
        ));
        assert!(matches!(
            classify_present("present", Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(RenderError::SwapchainStale)
        ));
        assert!(matches!(
            classify_present("present", Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(RenderError::Fatal(_))
        ));
    }
}
