// SPDX-License-Identifier: CEPL-1.0
//! Fly camera driven by WASD, Shift and relative mouse motion.

use prism_math::{Transform, Vec2, Vec3};
use prism_platform::winit::keyboard::KeyCode;

const PITCH_LIMIT: f32 = 89.0;

#[derive(Debug, Default, Clone, Copy)]
struct Held {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    sprint: bool,
}

#[derive(Debug, Clone)]
pub struct CameraController {
    held: Held,
    mouse: Vec2,
    pub speed: f32,
    pub sprint_factor: f32,
    /// Degrees per pixel.
    pub sensitivity: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            held: Held::default(),
            mouse: Vec2::ZERO,
            speed: 10.0,
            sprint_factor: 3.0,
            sensitivity: 0.1,
        }
    }
}

impl CameraController {
    /// Returns `true` if the key is one the controller uses.
    pub fn key(&mut self, code: KeyCode, pressed: bool) -> bool {
        let slot = match code {
            KeyCode::KeyW => &mut self.held.forward,
            KeyCode::KeyS => &mut self.held.back,
            KeyCode::KeyA => &mut self.held.left,
            KeyCode::KeyD => &mut self.held.right,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => &mut self.held.sprint,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    pub fn mouse_motion(&mut self, dx: f64, dy: f64) {
        self.mouse += Vec2::new(dx as f32, dy as f32);
    }

    /// Focus loss drops every held key.
    pub fn release_all(&mut self) {
        self.held = Held::default();
        self.mouse = Vec2::ZERO;
    }

    /// Applies held keys and accumulated mouse motion, then clears the motion.
    pub fn update(&mut self, camera: &mut Transform, dt: f32) {
        let mouse = std::mem::take(&mut self.mouse);
        let r = &mut camera.rotation_degrees;
        r.y -= mouse.x * self.sensitivity;
        r.x = (r.x + mouse.y * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let mut speed = self.speed * dt;
        if self.held.sprint {
            speed *= self.sprint_factor;
        }
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        let forward = axis(self.held.forward, self.held.back);
        // Looking down +Z in a right-handed view, +X is screen-left.
        let strafe = axis(self.held.left, self.held.right);
        if forward == 0.0 && strafe == 0.0 {
            return;
        }

        // Walk in the horizontal plane regardless of pitch.
        let yaw_only = Transform::default().with_rotation(Vec3::new(0.0, r.y, 0.0));
        let delta = yaw_only.forward() * forward + yaw_only.right() * strafe;
        camera.translate(delta * speed);
    }
}
