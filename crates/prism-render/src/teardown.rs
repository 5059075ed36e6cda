// SPDX-License-Identifier: CEPL-1.0
//! Ordered destruction of GPU handles.

use crate::FatalError;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    DepthBuffer,
    Framebuffers,
    CommandBuffers,
    Pipeline,
    PipelineLayout,
    RenderPass,
    ImageViews,
    Swapchain,
    Texture,
    DescriptorPool,
    DescriptorSetLayout,
    ObjectBuffers,
    Semaphores,
    CommandPools,
    Device,
    Surface,
    DebugMessenger,
    Instance,
}

/// Everything that depends on the swapchain extent or format.
pub const SWAPCHAIN_TEARDOWN: &[TeardownStep] = &[
    TeardownStep::DepthBuffer,
    TeardownStep::Framebuffers,
    TeardownStep::CommandBuffers,
    TeardownStep::Pipeline,
    TeardownStep::PipelineLayout,
    TeardownStep::RenderPass,
    TeardownStep::ImageViews,
    TeardownStep::Swapchain,
];

/// Reverse acquisition order. Starts with [`SWAPCHAIN_TEARDOWN`].
pub const FULL_TEARDOWN: &[TeardownStep] = &[
    TeardownStep::DepthBuffer,
    TeardownStep::Framebuffers,
    TeardownStep::CommandBuffers,
    TeardownStep::Pipeline,
    TeardownStep::PipelineLayout,
    TeardownStep::RenderPass,
    TeardownStep::ImageViews,
    TeardownStep::Swapchain,
    TeardownStep::Texture,
    TeardownStep::DescriptorPool,
    TeardownStep::DescriptorSetLayout,
    TeardownStep::ObjectBuffers,
    TeardownStep::Semaphores,
    TeardownStep::CommandPools,
    TeardownStep::Device,
    TeardownStep::Surface,
    TeardownStep::DebugMessenger,
    TeardownStep::Instance,
];

/// Owner of the handles. `destroy` must tolerate steps whose handles were
/// never created.
pub trait Teardown {
    fn wait_idle(&mut self) -> Result<(), FatalError>;
    fn destroy(&mut self, step: TeardownStep);
}

#[derive(Debug, Default)]
pub struct DisposalSequencer {
    disposed: bool,
}

impl DisposalSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Partial teardown ahead of swapchain recreation.
    pub fn release_swapchain<T: Teardown>(&self, target: &mut T) -> Result<(), FatalError> {
        if self.disposed {
            return Ok(());
        }
        target.wait_idle()?;
        for &step in SWAPCHAIN_TEARDOWN {
            target.destroy(step);
        }
        Ok(())
    }

    /// Full teardown. Returns `false` if it already ran.
    pub fn dispose<T: Teardown>(&mut self, target: &mut T) -> bool {
        if self.disposed {
            debug!(target: "prism::dispose", "already disposed");
            return false;
        }
        self.disposed = true;
        if let Err(e) = target.wait_idle() {
            warn!(target: "prism::dispose", "wait idle before teardown failed: {e}");
        }
        for &step in FULL_TEARDOWN {
            debug!(target: "prism::dispose", ?step, "destroy");
            target.destroy(step);
        }
        true
    }
}
