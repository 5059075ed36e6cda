// SPDX-License-Identifier: CEPL-1.0
//! Built-in meshes for the demo scene.

use prism_math::{Vec2, Vec3};
use prism_render::Mesh;

const QUAD_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

/// Eight shared corners; colors and UVs are per corner, not per face.
pub fn cube8() -> Mesh {
    let positions = [
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
    ];
    let colors = [Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE, Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE];
    let uvs: Vec<Vec2> = QUAD_UVS.iter().chain(QUAD_UVS.iter()).copied().collect();
    let indices = vec![
        0, 1, 2, 2, 3, 0, // front
        1, 5, 6, 6, 2, 1, // right
        7, 6, 5, 5, 4, 7, // back
        4, 0, 3, 3, 7, 4, // left
        4, 5, 1, 1, 0, 4, // bottom
        3, 2, 6, 6, 7, 3, // top
    ];
    Mesh::from_attributes(&positions, &colors, &uvs, indices)
}

/// Four vertices per face so every face gets the full texture. The name
/// counts indices.
pub fn cube36() -> Mesh {
    let faces: [[Vec3; 4]; 6] = [
        // front
        [
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ],
        // back
        [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
        ],
        // top
        [
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, -1.0),
        ],
        // bottom
        [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(-1.0, -1.0, 1.0),
        ],
        // right
        [
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
        ],
        // left
        [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, -1.0),
        ],
    ];

    let mut positions = Vec::with_capacity(24);
    let mut colors = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, corners) in faces.iter().enumerate() {
        let base = (face * 4) as u32;
        for (corner, &p) in corners.iter().enumerate() {
            positions.push(p);
            // Map -1..1 corners into 0..1 so each face shows a gradient.
            colors.push(p * 0.5 + Vec3::splat(0.5));
            uvs.push(QUAD_UVS[corner]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    Mesh::from_attributes(&positions, &colors, &uvs, indices)
}

/// Unit square on y = 0, facing +Y.
pub fn plane() -> Mesh {
    let positions = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(-1.0, 0.0, 1.0),
    ];
    let colors = [Vec3::splat(0.6); 4];
    Mesh::from_attributes(&positions, &colors, &QUAD_UVS, vec![0, 2, 1, 0, 3, 2])
}
