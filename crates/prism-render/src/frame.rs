// SPDX-License-Identifier: CEPL-1.0
//! Per-frame control flow: uniform upload, acquire, submit, present, and
//! swapchain recreation when the presentation engine reports staleness.

use crate::{FatalError, ObjectId, RenderError, RenderSize, Scene, UniformPayload};
use tracing::{debug, info, trace};

/// GPU side of a frame.
pub trait FrameBackend {
    fn extent(&self) -> RenderSize;
    /// Returns `false` when `id` was never provisioned.
    fn write_uniform(&mut self, id: ObjectId, payload: &UniformPayload)
        -> Result<bool, FatalError>;
    fn acquire_image(&mut self) -> Result<u32, RenderError>;
    fn submit(&mut self, image_index: u32) -> Result<(), FatalError>;
    /// Returns once the present queue has drained.
    fn present(&mut self, image_index: u32) -> Result<(), RenderError>;
    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<(), FatalError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Submitted,
    Presented,
    RecreatingSwapchain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Staleness was reported; the swapchain was rebuilt and this frame dropped
    /// or already presented.
    Recreated,
    /// Window has zero area.
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeOutcome {
    Paused,
    Recreated,
}

#[derive(Debug)]
pub struct FrameExecutor {
    state: FrameState,
    size: RenderSize,
    paused: bool,
    frames: u64,
    recreations: u64,
}

impl FrameExecutor {
    pub fn new(size: RenderSize) -> Self {
        Self {
            state: FrameState::Idle,
            size,
            paused: size.is_empty(),
            frames: 0,
            recreations: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    // STRICT PER-FRAME ORDER:
    // 1) write every object's uniforms (before acquire, unconditionally)
    // 2) acquire (unbounded wait); out-of-date -> recreate, no submit/present
    // 3) submit the prerecorded buffer for that image
    // 4) present; out-of-date or suboptimal -> recreate
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
    ) -> Result<FrameOutcome, FatalError> {
        if self.paused {
            return Ok(FrameOutcome::Skipped);
        }
        self.state = FrameState::Idle;

        // 1) uniforms
        let extent = backend.extent();
        let view = scene.camera.view_matrix();
        let projection = scene.camera.projection_matrix(extent);
        for object in &scene.objects {
            let payload = UniformPayload::new(object.transform.model_matrix(), view, projection);
            if !backend.write_uniform(object.id, &payload)? {
                trace!(target: "prism::frame", id = %object.id, "object was not provisioned, skipped");
            }
        }

        // 2) acquire
        self.state = FrameState::Acquiring;
        let image_index = match backend.acquire_image() {
            Ok(i) => i,
            Err(RenderError::SwapchainStale) => {
                debug!(target: "prism::frame", "acquire reported out-of-date");
                return self.recreate(backend);
            }
            Err(RenderError::Fatal(e)) => {
                self.state = FrameState::Idle;
                return Err(e);
            }
        };

        // 3) submit
        if let Err(e) = backend.submit(image_index) {
            self.state = FrameState::Idle;
            return Err(e);
        }
        self.state = FrameState::Submitted;

        // 4) present
        match backend.present(image_index) {
            Ok(()) => {
                self.state = FrameState::Presented;
                self.frames += 1;
                Ok(FrameOutcome::Presented)
            }
            Err(RenderError::SwapchainStale) => {
                debug!(target: "prism::frame", image_index, "present reported out-of-date or suboptimal");
                self.frames += 1;
                self.recreate(backend)
            }
            Err(RenderError::Fatal(e)) => {
                self.state = FrameState::Idle;
                Err(e)
            }
        }
    }

    /// Zero-area sizes pause rendering and never recreate.
    pub fn on_resize<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        size: RenderSize,
    ) -> Result<ResizeOutcome, FatalError> {
        self.size = size;
        if size.is_empty() {
            if !self.paused {
                info!(target: "prism::frame", "resize to {}x{} → paused", size.width, size.height);
            }
            self.paused = true;
            return Ok(ResizeOutcome::Paused);
        }
        if self.paused {
            info!(target: "prism::frame", "resize to {}x{} → resumed", size.width, size.height);
        }
        self.paused = false;
        self.recreate(backend)?;
        Ok(ResizeOutcome::Recreated)
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome, FatalError> {
        self.state = FrameState::RecreatingSwapchain;
        let result = backend.recreate_swapchain(self.size);
        self.state = FrameState::Idle;
        result?;
        self.recreations += 1;
        Ok(FrameOutcome::Recreated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Camera, IdAllocator, Mesh, RenderObject, Vertex};
    use prism_math::{Transform, Vec3};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Write(ObjectId),
        Acquire,
        Submit(u32),
        Present(u32),
        Recreate(RenderSize),
    }

    struct MockBackend {
        extent: RenderSize,
        known: HashSet<ObjectId>,
        calls: Vec<Call>,
        stale_acquires: u32,
        stale_presents: u32,
        next_image: u32,
        image_count: u32,
        last_payload: Option<UniformPayload>,
    }

    impl MockBackend {
        fn new(known: impl IntoIterator<Item = ObjectId>) -> Self {
            Self {
                extent: RenderSize::new(1920, 1080),
                known: known.into_iter().collect(),
                calls: Vec::new(),
                stale_acquires: 0,
                stale_presents: 0,
                next_image: 0,
                image_count: 3,
                last_payload: None,
            }
        }

        fn recreations(&self) -> Vec<RenderSize> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Recreate(s) => Some(*s),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn extent(&self) -> RenderSize {
            self.extent
        }
        fn write_uniform(&mut self, id: ObjectId, payload: &UniformPayload) -> Result<bool, FatalError> {
            self.calls.push(Call::Write(id));
            self.last_payload = Some(*payload);
            Ok(self.known.contains(&id))
        }
        fn acquire_image(&mut self) -> Result<u32, RenderError> {
            self.calls.push(Call::Acquire);
            if self.stale_acquires > 0 {
                self.stale_acquires -= 1;
                return Err(RenderError::SwapchainStale);
            }
            let i = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(i)
        }
        fn submit(&mut self, image_index: u32) -> Result<(), FatalError> {
            self.calls.push(Call::Submit(image_index));
            Ok(())
        }
        fn present(&mut self, image_index: u32) -> Result<(), RenderError> {
            self.calls.push(Call::Present(image_index));
            if self.stale_presents > 0 {
                self.stale_presents -= 1;
                return Err(RenderError::SwapchainStale);
            }
            Ok(())
        }
        fn recreate_swapchain(&mut self, size: RenderSize) -> Result<(), FatalError> {
            self.calls.push(Call::Recreate(size));
            self.extent = size;
            Ok(())
        }
    }

    fn scene(n: usize) -> Scene {
        let mut ids = IdAllocator::new();
        let mesh = Arc::new(Mesh::new(vec![Vertex::default(); 3], vec![0, 1, 2]));
        let objects = (0..n)
            .map(|i| {
                RenderObject::new(
                    &mut ids,
                    mesh.clone(),
                    Transform::from_position(Vec3::new(i as f32, 0.0, 5.0)),
                )
            })
            .collect();
        Scene {
            objects,
            camera: Camera::default(),
        }
    }

    fn ids(scene: &Scene) -> Vec<ObjectId> {
        scene.objects.iter().map(|o| o.id).collect()
    }

    #[test]
    fn steady_state_writes_uniforms_before_acquire() {
        let scene = scene(2);
        let mut backend = MockBackend::new(ids(&scene));
        let mut exec = FrameExecutor::new(RenderSize::new(1920, 1080));

        let outcome = exec.draw_frame(&mut backend, &scene).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(exec.state(), FrameState::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Write(scene.objects[0].id),
                Call::Write(scene.objects[1].id),
                Call::Acquire,
                Call::Submit(0),
                Call::Present(0),
            ]
        );
        assert_eq!(exec.frames_presented(), 1);
    }

    #[test]
    fn uniform_carries_current_transform() {
        let scene = scene(2);
        let mut backend = MockBackend::new(ids(&scene));
        let mut exec = FrameExecutor::new(RenderSize::new(1920, 1080));
        exec.draw_frame(&mut backend, &scene).unwrap();

        let payload = backend.last_payload.unwrap();
        assert_eq!(&payload.model[12..15], &[1.0, 0.0, 5.0]);
        let proj = scene.camera.projection_matrix(RenderSize::new(1920, 1080));
        assert_eq!(payload.projection, proj.to_cols_array());
    }

    #[test]
    fn stale_acquire_recreates_without_submit() {
        let scene = scene(1);
        let mut backend = MockBackend::new(ids(&scene));
        backend.stale_acquires = 1;
        let mut exec = FrameExecutor::new(RenderSize::new(1920, 1080));

        let outcome = exec.draw_frame(&mut backend, &scene).unwrap();
        assert_eq!(outcome, FrameOutcome::Recreated);
        assert!(!backend.calls.iter().any(|c| matches!(c, Call::Submit(_) | Call::Present(_))));
        assert_eq!(backend.recreations(), vec![RenderSize::new(1920, 1080)]);
        assert_eq!(exec.state(), FrameState::Idle);

        // Next frame runs normally.
        assert_eq!(exec.draw_frame(&mut backend, &scene).unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn stale_present_recreates_instead_of_failing() {
        let scene = scene(1);
        let mut backend = MockBackend::new(ids(&scene));
        backend.stale_presents = 1;
        let mut exec = FrameExecutor::new(RenderSize::new(800, 600));

        let outcome = exec.draw_frame(&mut backend, &scene).unwrap();
        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(exec.recreation_count(), 1);
        assert!(matches!(backend.calls.last(), Some(Call::Recreate(_))));
    }

    #[test]
    fn minimize_and_restore_recreates_once() {
        let scene = scene(1);
        let mut backend = MockBackend::new(ids(&scene));
        let mut exec = FrameExecutor::new(RenderSize::new(1920, 1080));

        assert_eq!(
            exec.on_resize(&mut backend, RenderSize::new(0, 0)).unwrap(),
            ResizeOutcome::Paused
        );
        assert_eq!(exec.draw_frame(&mut backend, &scene).unwrap(), FrameOutcome::Skipped);
        assert!(backend.calls.is_empty());

        assert_eq!(
            exec.on_resize(&mut backend, RenderSize::new(1280, 720)).unwrap(),
            ResizeOutcome::Recreated
        );
        assert_eq!(backend.recreations(), vec![RenderSize::new(1280, 720)]);
        assert_eq!(exec.recreation_count(), 1);
        assert!(!exec.is_paused());
    }

    #[test]
    fn unknown_objects_are_skipped() {
        let scene = scene(2);
        let mut backend = MockBackend::new([scene.objects[0].id]);
        let mut exec = FrameExecutor::new(RenderSize::new(640, 480));
        assert_eq!(exec.draw_frame(&mut backend, &scene).unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn fatal_acquire_propagates() {
        struct Broken(MockBackend);
        impl FrameBackend for Broken {
            fn extent(&self) -> RenderSize {
                self.0.extent()
            }
            fn write_uniform(&mut self, id: ObjectId, p: &UniformPayload) -> Result<bool, FatalError> {
                self.0.write_uniform(id, p)
            }
            fn acquire_image(&mut self) -> Result<u32, RenderError> {
                Err(FatalError::Api {
                    call: "vkAcquireNextImageKHR",
                    result: "ERROR_DEVICE_LOST".into(),
                }
                .into())
            }
            fn submit(&mut self, i: u32) -> Result<(), FatalError> {
                self.0.submit(i)
            }
            fn present(&mut self, i: u32) -> Result<(), RenderError> {
                self.0.present(i)
            }
            fn recreate_swapchain(&mut self, s: RenderSize) -> Result<(), FatalError> {
                self.0.recreate_swapchain(s)
            }
        }

        let scene = scene(0);
        let mut backend = Broken(MockBackend::new(Vec::new()));
        let mut exec = FrameExecutor::new(RenderSize::new(640, 480));
        assert!(matches!(
            exec.draw_frame(&mut backend, &scene),
            Err(FatalError::Api { .. })
        ));
        assert!(backend.0.calls.is_empty());
        assert_eq!(exec.state(), FrameState::Idle);
    }
}
