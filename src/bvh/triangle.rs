//! The BVH input primitive: a triangle with cached centroid and AABB.

use crate::core::types::Vec3;
use crate::math::Aabb;
use bytemuck::{Pod, Zeroable};

/// One triangle, carried through build with its material attributes and a
/// precomputed centroid/AABB so binning never recomputes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub emissiveness: f32,
    pub shininess: f32,
    pub material_id: u32,
    pub centroid: Vec3,
    pub aabb: Aabb,
}

impl Triangle {
    pub fn new(
        v0: Vec3,
        v1: Vec3,
        v2: Vec3,
        color: Vec3,
        emissiveness: f32,
        shininess: f32,
        material_id: u32,
    ) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        let centroid = (v0 + v1 + v2) / 3.0;
        let aabb = Aabb::new(v0.min(v1).min(v2), v0.max(v1).max(v2));
        Self { v0, v1, v2, normal, color, emissiveness, shininess, material_id, centroid, aabb }
    }

    /// Apply a world transform, recomputing normal, centroid, and AABB from
    /// the transformed vertices rather than transforming them in place
    /// (cheap to get wrong under non-uniform scale).
    pub fn transformed(&self, mat: crate::core::types::Mat4) -> Self {
        Self::new(
            mat.transform_point3(self.v0),
            mat.transform_point3(self.v1),
            mat.transform_point3(self.v2),
            self.color,
            self.emissiveness,
            self.shininess,
            self.material_id,
        )
    }
}

/// GPU-side layout: `{v0, v1, v2, normal}` as four `vec4` (w = padding),
/// `{color, emissiveness}` as one `vec4`, then `{shininess, material_id, pad[2]}`.
/// 64 bytes total, std430-compatible.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 4],
    pub v1: [f32; 4],
    pub v2: [f32; 4],
    pub normal: [f32; 4],
    pub color_emissiveness: [f32; 4],
    pub shininess: f32,
    pub material_id: u32,
    pub _pad: [f32; 2],
}

impl From<&Triangle> for GpuTriangle {
    fn from(t: &Triangle) -> Self {
        Self {
            v0: [t.v0.x, t.v0.y, t.v0.z, 0.0],
            v1: [t.v1.x, t.v1.y, t.v1.z, 0.0],
            v2: [t.v2.x, t.v2.y, t.v2.z, 0.0],
            normal: [t.normal.x, t.normal.y, t.normal.z, 0.0],
            color_emissiveness: [t.color.x, t.color.y, t.color.z, t.emissiveness],
            shininess: t.shininess,
            material_id: t.material_id,
            _pad: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_triangle_is_64_bytes() {
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 64);
    }

    #[test]
    fn test_centroid_and_aabb() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::ONE,
            0.0,
            32.0,
            1,
        );
        assert_eq!(t.centroid, Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0));
        assert_eq!(t.aabb.min, Vec3::ZERO);
        assert_eq!(t.aabb.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_transformed_translates_vertices_and_keeps_material() {
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE, 0.2, 8.0, 3);
        let mat = crate::core::types::Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let moved = t.transformed(mat);
        assert_eq!(moved.v0, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.v1, Vec3::new(6.0, 0.0, 0.0));
        assert_eq!(moved.material_id, 3);
        assert_eq!(moved.emissiveness, 0.2);
    }

    #[test]
    fn test_gpu_conversion_preserves_fields() {
        let t = Triangle::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(7.0, 8.0, 9.0),
            Vec3::new(0.1, 0.2, 0.3),
            0.5,
            16.0,
            7,
        );
        let gpu = GpuTriangle::from(&t);
        assert_eq!(gpu.v0, [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(gpu.color_emissiveness, [0.1, 0.2, 0.3, 0.5]);
        assert_eq!(gpu.material_id, 7);
    }
}
