//! Ray traversal over a built BVH.
//!
//! Stack-based descent: push both children, test each against the ray,
//! recurse into whichever overlap. A plain `Vec` stack rather than a
//! fixed-size array, since the tree depth here isn't bounded tightly
//! enough to make that worthwhile.

use crate::core::types::Vec3;
use crate::math::Ray;

use super::builder::Bvh;
use super::triangle::Triangle;

/// Closest ray-triangle hit: which original triangle, and at what `t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub triangle_index: u32,
    pub t: f32,
}

/// Find the closest triangle hit by `ray`, if any.
pub fn intersect(bvh: &Bvh, triangles: &[Triangle], ray: &Ray) -> Option<Hit> {
    if !bvh.built {
        return None;
    }

    let mut best: Option<Hit> = None;
    let mut stack = vec![0usize];

    while let Some(idx) = stack.pop() {
        let node = &bvh.nodes[idx];
        if ray.intersects_aabb(&node.aabb()).is_none() {
            continue;
        }

        if node.is_leaf() {
            let start = node.first_tri_index() as usize;
            for &orig in &bvh.tri_indices[start..start + node.tri_count as usize] {
                let t = &triangles[orig as usize];
                if let Some(hit_t) = ray_triangle(ray, t.v0, t.v1, t.v2) {
                    if best.is_none_or(|b| hit_t < b.t) {
                        best = Some(Hit { triangle_index: orig, t: hit_t });
                    }
                }
            }
        } else {
            stack.push(node.left_child() as usize);
            stack.push(node.right_child() as usize);
        }
    }

    best
}

/// Linear scan over every triangle, used only to cross-check [`intersect`]
/// in tests.
pub fn brute_force_intersect(triangles: &[Triangle], ray: &Ray) -> Option<Hit> {
    let mut best: Option<Hit> = None;
    for (i, t) in triangles.iter().enumerate() {
        if let Some(hit_t) = ray_triangle(ray, t.v0, t.v1, t.v2) {
            if best.is_none_or(|b| hit_t < b.t) {
                best = Some(Hit { triangle_index: i as u32, t: hit_t });
            }
        }
    }
    best
}

const EPSILON: f32 = 1e-6;

/// Moller-Trumbore ray-triangle intersection.
fn ray_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);
    if a.abs() < EPSILON {
        return None;
    }
    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = f * edge2.dot(q);
    (t > EPSILON).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BvhConfig;

    fn unit_cube_triangles(offset: Vec3) -> Vec<Triangle> {
        let corners = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let faces: [[usize; 3]; 12] = [
            [0, 1, 2], [0, 2, 3],
            [4, 6, 5], [4, 7, 6],
            [0, 4, 5], [0, 5, 1],
            [3, 2, 6], [3, 6, 7],
            [0, 3, 7], [0, 7, 4],
            [1, 5, 6], [1, 6, 2],
        ];
        faces
            .iter()
            .map(|f| Triangle::new(corners[f[0]] + offset, corners[f[1]] + offset, corners[f[2]] + offset, Vec3::ONE, 0.0, 32.0, 0))
            .collect()
    }

    fn grid_scene() -> Vec<Triangle> {
        let mut tris = Vec::new();
        for gx in 0..4 {
            for gz in 0..3 {
                tris.extend(unit_cube_triangles(Vec3::new(gx as f32 * 3.0, 0.0, gz as f32 * 3.0)));
            }
        }
        tris
    }

    #[test]
    fn test_bvh_traversal_matches_brute_force() {
        let tris = grid_scene();
        let bvh = Bvh::build(&tris, &BvhConfig::default());

        // Cube (2, 1) sits at grid offset (gx=2, gz=1) -> world origin (6, 0, 3).
        let ray = Ray::new(Vec3::new(6.5, 0.5, -5.0), Vec3::new(0.0, 0.0, 1.0));

        let via_bvh = intersect(&bvh, &tris, &ray);
        let via_brute = brute_force_intersect(&tris, &ray);

        assert!(via_bvh.is_some());
        assert_eq!(via_bvh.map(|h| h.triangle_index), via_brute.map(|h| h.triangle_index));
    }

    #[test]
    fn test_miss_returns_none() {
        let tris = grid_scene();
        let bvh = Bvh::build(&tris, &BvhConfig::default());
        let ray = Ray::new(Vec3::new(1000.0, 1000.0, 1000.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(intersect(&bvh, &tris, &ray).is_none());
    }

    #[test]
    fn test_unbuilt_bvh_returns_none() {
        let bvh = Bvh::empty();
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(intersect(&bvh, &[], &ray).is_none());
    }
}
