// SPDX-License-Identifier: CEPL-1.0
//! Demo scene: an optional floor and a grid of spinning cubes. Even cells
//! use the per-face cube, odd cells the shared-corner one.

use crate::config::{CameraCfg, SceneCfg};
use crate::primitives;
use prism_math::{Transform, Vec3};
use prism_render::{Camera, IdAllocator, RenderObject, Scene};
use std::sync::Arc;

const FLOOR_EXTENT: f32 = 100.0;

pub struct Demo {
    pub scene: Scene,
    /// Indices into `scene.objects` and their spin in degrees per second.
    spinning: Vec<(usize, Vec3)>,
}

impl Demo {
    pub fn new(scene_cfg: &SceneCfg, camera_cfg: &CameraCfg) -> Self {
        let mut ids = IdAllocator::new();
        let mut objects = Vec::new();
        let mut spinning = Vec::new();

        if scene_cfg.floor {
            let floor = Transform::default().with_scale(Vec3::new(FLOOR_EXTENT, 1.0, FLOOR_EXTENT));
            objects.push(RenderObject::new(&mut ids, Arc::new(primitives::plane()), floor));
        }

        let faced = Arc::new(primitives::cube36());
        let cornered = Arc::new(primitives::cube8());
        let side = (scene_cfg.cubes as f32).sqrt().ceil().max(1.0) as u32;
        let half = (side - 1) as f32 * 0.5;
        for i in 0..scene_cfg.cubes {
            let (row, col) = (i / side, i % side);
            let position = Vec3::new(
                (col as f32 - half) * scene_cfg.spacing,
                1.5 + (i % 3) as f32,
                (row as f32 - half) * scene_cfg.spacing,
            );
            let phase = i as f32 * 37.0;
            let transform = Transform::from_position(position)
                .with_rotation(Vec3::new(phase, phase * 0.5, 0.0))
                .with_scale(Vec3::splat(0.5 + (i % 4) as f32 * 0.25));
            spinning.push((objects.len(), Vec3::new(15.0, 45.0 + (i % 5) as f32 * 10.0, 0.0)));
            let mesh = if i % 2 == 0 { &faced } else { &cornered };
            objects.push(RenderObject::new(&mut ids, Arc::clone(mesh), transform));
        }

        let camera = Camera {
            transform: Transform::from_position(Vec3::from_array(camera_cfg.position)),
            fov_y_degrees: camera_cfg.fov_degrees,
            near: camera_cfg.near,
            far: camera_cfg.far,
        };

        Self {
            scene: Scene { objects, camera },
            spinning,
        }
    }

    pub fn update(&mut self, dt: f32) {
        for &(index, rate) in &self.spinning {
            if let Some(object) = self.scene.objects.get_mut(index) {
                object.transform.rotate(rate * dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn floor_plus_cubes_with_unique_ids() {
        let demo = Demo::new(
            &SceneCfg {
                cubes: 10,
                spacing: 2.0,
                floor: true,
            },
            &CameraCfg::default(),
        );
        assert_eq!(demo.scene.objects.len(), 11);
        let ids: HashSet<_> = demo.scene.objects.iter().map(|o| o.id).collect();
        assert_eq!(ids.len(), 11);
        assert_eq!(demo.scene.camera.fov_y_degrees, 45.0);
    }

    #[test]
    fn only_cubes_spin() {
        let mut demo = Demo::new(
            &SceneCfg {
                cubes: 2,
                spacing: 2.0,
                floor: true,
            },
            &CameraCfg::default(),
        );
        let floor_before = demo.scene.objects[0].transform;
        let cube_before = demo.scene.objects[1].transform;
        demo.update(1.0);
        assert_eq!(demo.scene.objects[0].transform, floor_before);
        assert_ne!(demo.scene.objects[1].transform, cube_before);
    }

    #[test]
    fn grid_alternates_cube_meshes() {
        let demo = Demo::new(
            &SceneCfg {
                cubes: 3,
                spacing: 2.0,
                floor: false,
            },
            &CameraCfg::default(),
        );
        let vertex_counts: Vec<usize> = demo
            .scene
            .objects
            .iter()
            .map(|o| o.mesh.vertices.len())
            .collect();
        assert_eq!(vertex_counts, vec![24, 8, 24]);
        assert!(demo.scene.objects.iter().all(|o| o.mesh.index_count() == 36));
    }

    #[test]
    fn empty_scene_is_allowed() {
        let demo = Demo::new(
            &SceneCfg {
                cubes: 0,
                spacing: 2.0,
                floor: false,
            },
            &CameraCfg::default(),
        );
        assert!(demo.scene.objects.is_empty());
    }
}
