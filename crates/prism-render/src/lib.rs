// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic renderer core: scene data, per-object resource table,
//! frame state machine, and teardown ordering.

mod error;
pub mod frame;
pub mod record;
pub mod scene;
pub mod table;
pub mod teardown;

pub use error::{FatalError, RenderError};
pub use frame::{FrameBackend, FrameExecutor, FrameOutcome, FrameState, ResizeOutcome};
pub use record::{record_scene, ClearValues, CommandRecorder, IndexedDraw};
pub use scene::{
    Camera, IdAllocator, Mesh, ObjectId, RenderObject, Scene, TextureData, UniformPayload, Vertex,
};
pub use table::ResourceTable;
pub use teardown::{DisposalSequencer, Teardown, TeardownStep, FULL_TEARDOWN, SWAPCHAIN_TEARDOWN};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

pub trait Renderer {
    /// Uploads uniforms, then acquires, submits, and presents one image.
    fn draw_frame(&mut self, scene: &Scene) -> Result<FrameOutcome, FatalError>;
    fn on_window_resized(&mut self, size: RenderSize) -> Result<ResizeOutcome, FatalError>;
    /// Re-records the draw command buffers.
    fn set_clear_color(&mut self, rgba: [f32; 4]) -> Result<(), FatalError>;
    /// Idempotent.
    fn dispose(&mut self);
}
