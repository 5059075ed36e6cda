// SPDX-License-Identifier: CEPL-1.0
//! Host-facing data consumed by the renderer: meshes, objects, camera, and
//! the per-object uniform payload.

use crate::{FatalError, RenderSize};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use prism_math::Transform;
use std::fmt;
use std::mem::{offset_of, size_of};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out object ids. Ids are never reused for the allocator's lifetime,
/// so one allocator should outlive every object list built from it.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        id
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = size_of::<Vertex>() as u32;
    pub const POS_OFFSET: u32 = offset_of!(Vertex, pos) as u32;
    pub const COLOR_OFFSET: u32 = offset_of!(Vertex, color) as u32;
    pub const UV_OFFSET: u32 = offset_of!(Vertex, uv) as u32;

    pub fn new(pos: Vec3, color: Vec3, uv: Vec2) -> Self {
        Self {
            pos: pos.to_array(),
            color: color.to_array(),
            uv: uv.to_array(),
        }
    }
}

/// Immutable geometry. Indices are 32-bit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Zips parallel attribute lists. Missing colors default to white and
    /// missing UVs to the origin.
    pub fn from_attributes(
        positions: &[Vec3],
        colors: &[Vec3],
        uvs: &[Vec2],
        indices: Vec<u32>,
    ) -> Self {
        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let c = colors.get(i).copied().unwrap_or(Vec3::ONE);
                let uv = uvs.get(i).copied().unwrap_or(Vec2::ZERO);
                Vertex::new(p, c, uv)
            })
            .collect();
        Self { vertices, indices }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// GPU buffers cannot be zero-sized and every index must hit a vertex.
    pub fn validate(&self, id: ObjectId) -> Result<(), FatalError> {
        if self.vertices.is_empty() {
            return Err(FatalError::InvalidMesh {
                id,
                reason: "mesh has no vertices",
            });
        }
        if self.indices.is_empty() {
            return Err(FatalError::InvalidMesh {
                id,
                reason: "mesh has no indices",
            });
        }
        let count = self.vertices.len() as u32;
        if self.indices.iter().any(|&i| i >= count) {
            return Err(FatalError::InvalidMesh {
                id,
                reason: "index out of range",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RenderObject {
    pub id: ObjectId,
    pub mesh: Arc<Mesh>,
    pub transform: Transform,
}

impl RenderObject {
    pub fn new(ids: &mut IdAllocator, mesh: Arc<Mesh>, transform: Transform) -> Self {
        Self {
            id: ids.allocate(),
            mesh,
            transform,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    /// Scale is ignored.
    pub transform: Transform,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        let eye = self.transform.position;
        Mat4::look_at_rh(eye, eye + self.transform.forward(), self.transform.up())
    }

    /// Right-handed, 0..1 depth, Y flipped for Vulkan clip space.
    pub fn projection_matrix(&self, extent: RenderSize) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            extent.aspect(),
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Model, view, projection. Tightly packed, 192 bytes, memory-mapped as-is.
///
/// Each matrix is stored as glam's column-major array, which matches the
/// row-major layout of the equivalent row-vector matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformPayload {
    pub model: [f32; 16],
    pub view: [f32; 16],
    pub projection: [f32; 16],
}

impl UniformPayload {
    pub const SIZE: usize = size_of::<UniformPayload>();

    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array(),
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, FatalError> {
        let expected = width as usize * height as usize * 4;
        if expected == 0 || rgba.len() != expected {
            return Err(FatalError::InvalidTexture {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Single opaque white texel; sampling it leaves vertex colors unchanged.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

/// Everything a frame needs from game logic.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub objects: Vec<RenderObject>,
    pub camera: Camera,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh::from_attributes(
            &[Vec3::ZERO, Vec3::X, Vec3::Y],
            &[Vec3::X, Vec3::Y, Vec3::Z],
            &[Vec2::ZERO, Vec2::X, Vec2::Y],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(Vertex::POS_OFFSET, 0);
        assert_eq!(Vertex::COLOR_OFFSET, 12);
        assert_eq!(Vertex::UV_OFFSET, 24);
    }

    #[test]
    fn vertex_bytes_follow_field_order() {
        let mesh = triangle();
        let bytes = mesh.vertex_bytes();
        assert_eq!(bytes.len(), 3 * 32);
        let second: &[f32] = bytemuck::cast_slice(&bytes[32..64]);
        assert_eq!(second, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(mesh.index_bytes().len(), 12);
    }

    #[test]
    fn missing_attributes_get_defaults() {
        let mesh = Mesh::from_attributes(&[Vec3::ONE], &[], &[], vec![0]);
        assert_eq!(mesh.vertices[0].color, [1.0, 1.0, 1.0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn uniform_payload_identity_layout() {
        let payload = UniformPayload::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);
        let bytes = payload.as_bytes();
        assert_eq!(bytes.len(), 192);
        assert_eq!(UniformPayload::SIZE, 192);

        for (matrix, base) in [0usize, 64, 128].into_iter().enumerate() {
            for element in 0..16 {
                let at = base + element * 4;
                let value = f32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap());
                let expected = if element % 5 == 0 { 1.0 } else { 0.0 };
                assert_eq!(value, expected, "matrix {matrix} element {element}");
            }
        }

        let back = UniformPayload::from_bytes(bytes).unwrap();
        assert_eq!(back, payload);
        assert!(UniformPayload::from_bytes(&bytes[..191]).is_none());
    }

    #[test]
    fn ids_are_monotonic_across_rebuilds() {
        let mut ids = IdAllocator::new();
        let mesh = Arc::new(triangle());
        let first: Vec<_> = (0..3)
            .map(|_| RenderObject::new(&mut ids, mesh.clone(), Transform::default()).id)
            .collect();
        // The list is thrown away and rebuilt with the same allocator.
        let second: Vec<_> = (0..3)
            .map(|_| RenderObject::new(&mut ids, mesh.clone(), Transform::default()).id)
            .collect();
        let all: Vec<_> = first.iter().chain(second.iter()).map(|id| id.get()).collect();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn validate_rejects_bad_meshes() {
        let id = IdAllocator::new().allocate();
        assert!(triangle().validate(id).is_ok());
        assert!(matches!(
            Mesh::default().validate(id),
            Err(FatalError::InvalidMesh { .. })
        ));
        let mut bad = triangle();
        bad.indices.push(3);
        assert!(bad.validate(id).is_err());
    }

    #[test]
    fn projection_flips_y_and_maps_near_to_zero() {
        let cam = Camera::default();
        let proj = cam.projection_matrix(RenderSize::new(800, 600));
        assert!(proj.y_axis.y < 0.0);
        let clip = proj * glam::Vec4::new(0.0, 0.0, -cam.near, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);
        let far = proj * glam::Vec4::new(0.0, 0.0, -cam.far, 1.0);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn default_camera_looks_down_positive_z() {
        let cam = Camera::default();
        let p = cam.view_matrix().transform_point3(Vec3::new(0.0, 0.0, 5.0));
        // Right-handed view space looks down -Z.
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn texture_size_is_checked() {
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::new(2, 2, vec![0; 15]),
            Err(FatalError::InvalidTexture { expected: 16, .. })
        ));
        assert_eq!(TextureData::white().rgba(), &[255, 255, 255, 255]);
    }
}
