// SPDX-License-Identifier: CEPL-1.0
//! Vulkan renderer on `ash`.
//!
//! Initialisation is split in two. [`PendingRenderer::start`] creates the
//! device, swapchain and every per-object resource on the calling thread,
//! then builds the graphics pipeline on a cancellable background task.
//! [`PendingRenderer::poll`] hands back a [`VkRenderer`] once it is done.

pub mod context;
mod error;
pub mod features;
pub mod frame;
pub mod gpu;
pub mod memory;
pub mod pipeline;
pub mod resources;
pub mod swapchain;
pub mod texture;

pub use context::{ContextConfig, DeviceContext};
pub use features::DeviceFeatures;
pub use pipeline::ShaderSet;

use frame::{FrameContext, Semaphores};
use gpu::GpuState;
use pipeline::PipelineSet;
use prism_core::{InitTask, TaskPoll};
use prism_render::{
    DisposalSequencer, FatalError, FrameExecutor, FrameOutcome, RenderSize, Renderer,
    ResizeOutcome, Scene, TextureData,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use resources::ObjectResources;
use texture::Texture;
use tracing::{debug, info};

/// Everything the host decides before the first frame.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub app_name: String,
    pub validation: bool,
    pub clear_color: [f32; 4],
    /// `None` selects the built-in shaders.
    pub shaders: Option<ShaderSet>,
    pub texture: TextureData,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "prism".to_owned(),
            validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: None,
            texture: TextureData::white(),
        }
    }
}

impl RendererConfig {
    fn context_config(&self) -> ContextConfig {
        ContextConfig {
            app_name: self.app_name.clone(),
            validation: self.validation,
            ..ContextConfig::default()
        }
    }
}

type PipelineTask = InitTask<PipelineSet, FatalError>;

pub enum InitProgress {
    Pending(PendingRenderer),
    Ready(VkRenderer),
    Cancelled,
}

/// A renderer whose pipeline is still being built.
pub struct PendingRenderer {
    gpu: Option<GpuState>,
    task: Option<PipelineTask>,
    size: RenderSize,
}

impl PendingRenderer {
    // STRICT ORDER:
    // 1) device context (instance, surface, device, queues)
    // 2) depth format, command pools, swapchain + depth buffer
    // 3) descriptor layout, shared texture, per-object resources, semaphores
    // 4) pipeline on the init task; framebuffers and recording wait for it
    pub fn start(
        config: &RendererConfig,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        scene: &Scene,
    ) -> Result<Self, FatalError> {
        if size.is_empty() {
            return Err(FatalError::EmptySurface);
        }
        let shaders = match &config.shaders {
            Some(s) => s.clone(),
            None => ShaderSet::builtin()?,
        };
        let dh = display
            .display_handle()
            .map_err(|e| FatalError::WindowHandle(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| FatalError::WindowHandle(e.to_string()))?
            .as_raw();

        let ctx = unsafe { DeviceContext::for_window(&config.context_config(), dh, wh)? };
        let depth_format = match unsafe { swapchain::pick_depth_format(&ctx) } {
            Ok(f) => f,
            Err(e) => {
                let mut gpu = GpuState::new(ctx, ash::vk::Format::UNDEFINED, shaders);
                DisposalSequencer::new().dispose(&mut gpu);
                return Err(e);
            }
        };

        let mut gpu = GpuState::new(ctx, depth_format, shaders);
        gpu.clear.color = config.clear_color;
        if let Err(e) = unsafe { Self::prepare(&mut gpu, config, size, scene) } {
            DisposalSequencer::new().dispose(&mut gpu);
            return Err(e);
        }

        let device = gpu.ctx.device.clone();
        let desc = gpu.pipeline_desc();
        let shaders = gpu.shaders.clone();
        let task = InitTask::spawn("prism-pipeline", move |token| unsafe {
            pipeline::build_pipeline(&device, &desc, &shaders, &token)
        });
        let task = match task {
            Ok(t) => t,
            Err(e) => {
                DisposalSequencer::new().dispose(&mut gpu);
                return Err(FatalError::InitTaskSpawn(e.to_string()));
            }
        };

        Ok(Self {
            gpu: Some(gpu),
            task: Some(task),
            size,
        })
    }

    unsafe fn prepare(
        gpu: &mut GpuState,
        config: &RendererConfig,
        size: RenderSize,
        scene: &Scene,
    ) -> Result<(), FatalError> {
        gpu.create_command_pools()?;
        gpu.create_swapchain(size)?;
        gpu.set_layout = pipeline::create_descriptor_set_layout(&gpu.ctx.device)?;
        gpu.texture = Texture::upload(
            &gpu.one_shot(),
            &gpu.ctx.memory_properties,
            gpu.ctx.max_sampler_anisotropy(),
            &config.texture,
        )?;
        gpu.objects = ObjectResources::provision(
            &gpu.one_shot(),
            &gpu.ctx.memory_properties,
            gpu.set_layout,
            gpu.texture.descriptor(),
            &scene.objects,
        )?;
        gpu.semaphores = Semaphores::new(&gpu.ctx.device)?;
        Ok(())
    }

    /// Requests cancellation. The next [`poll`](Self::poll) that observes it
    /// returns [`InitProgress::Cancelled`] with everything released.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    /// Non-blocking.
    pub fn poll(mut self) -> Result<InitProgress, FatalError> {
        let Some(task) = self.task.take() else {
            return Ok(InitProgress::Cancelled);
        };
        match task.poll() {
            TaskPoll::Running(task) => {
                self.task = Some(task);
                Ok(InitProgress::Pending(self))
            }
            done => self.complete(done),
        }
    }

    fn complete(
        mut self,
        done: TaskPoll<PipelineSet, FatalError>,
    ) -> Result<InitProgress, FatalError> {
        let pipeline = match done {
            TaskPoll::Completed(set) => set,
            TaskPoll::Running(task) => {
                self.task = Some(task);
                return Ok(InitProgress::Pending(self));
            }
            TaskPoll::Cancelled => {
                info!(target: "prism::task", "initialisation cancelled");
                return Ok(InitProgress::Cancelled);
            }
            TaskPoll::Failed(e) => return Err(e),
            TaskPoll::Panicked => return Err(FatalError::InitTaskPanicked),
        };
        let Some(mut gpu) = self.gpu.take() else {
            return Ok(InitProgress::Cancelled);
        };

        gpu.pipeline = pipeline;
        let mut sequencer = DisposalSequencer::new();
        if let Err(e) = unsafe { gpu.finish_swapchain_dependents() } {
            sequencer.dispose(&mut gpu);
            return Err(e);
        }
        info!(
            target: "prism::context",
            width = gpu.swapchain.extent.width,
            height = gpu.swapchain.extent.height,
            objects = gpu.objects.table.len(),
            "renderer ready"
        );
        Ok(InitProgress::Ready(VkRenderer {
            frames: FrameExecutor::new(self.size),
            gpu,
            sequencer,
        }))
    }
}

impl Drop for PendingRenderer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
            if let TaskPoll::Completed(mut set) = task.join() {
                if let Some(gpu) = &self.gpu {
                    unsafe { set.destroy(&gpu.ctx.device) };
                }
            }
        }
        if let Some(mut gpu) = self.gpu.take() {
            debug!(target: "prism::dispose", "releasing partially initialised renderer");
            DisposalSequencer::new().dispose(&mut gpu);
        }
    }
}

pub struct VkRenderer {
    gpu: GpuState,
    frames: FrameExecutor,
    sequencer: DisposalSequencer,
}

impl VkRenderer {
    pub fn frames(&self) -> &FrameExecutor {
        &self.frames
    }
}

impl Renderer for VkRenderer {
    fn draw_frame(&mut self, scene: &Scene) -> Result<FrameOutcome, FatalError> {
        if self.sequencer.is_disposed() {
            return Ok(FrameOutcome::Skipped);
        }
        let mut backend = FrameContext {
            gpu: &mut self.gpu,
            sequencer: &self.sequencer,
        };
        self.frames.draw_frame(&mut backend, scene)
    }

    fn on_window_resized(&mut self, size: RenderSize) -> Result<ResizeOutcome, FatalError> {
        if self.sequencer.is_disposed() {
            return Ok(ResizeOutcome::Paused);
        }
        let mut backend = FrameContext {
            gpu: &mut self.gpu,
            sequencer: &self.sequencer,
        };
        self.frames.on_resize(&mut backend, size)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<(), FatalError> {
        self.gpu.clear.color = rgba;
        if self.sequencer.is_disposed() {
            return Ok(());
        }
        unsafe {
            self.gpu.ctx.wait_idle()?;
            self.gpu.record_commands()
        }
    }

    fn dispose(&mut self) {
        if self.sequencer.dispose(&mut self.gpu) {
            info!(target: "prism::dispose", frames = self.frames.frames_presented(), "renderer disposed");
        }
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{DisplayHandle, HandleError, WindowHandle};

    struct Headless;

    impl HasWindowHandle for Headless {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for Headless {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    #[test]
    fn empty_window_is_rejected_before_any_device_work() {
        for size in [RenderSize::new(0, 0), RenderSize::new(640, 0), RenderSize::new(0, 480)] {
            let started = PendingRenderer::start(
                &RendererConfig::default(),
                &Headless,
                &Headless,
                size,
                &Scene::default(),
            );
            assert!(matches!(started, Err(FatalError::EmptySurface)));
        }
    }

    #[test]
    fn nonzero_window_reaches_handle_lookup() {
        let started = PendingRenderer::start(
            &RendererConfig::default(),
            &Headless,
            &Headless,
            RenderSize::new(640, 480),
            &Scene::default(),
        );
        assert!(matches!(started, Err(FatalError::WindowHandle(_))));
    }
}
