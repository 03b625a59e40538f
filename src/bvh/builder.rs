//! The SAH BVH builder.
//!
//! A binned builder: bucket accumulation followed by a prefix/suffix
//! surface-area scan to find the minimum-cost split, evaluated on 16 bins
//! across all three axes. The flat "left child always follows its parent,
//! right child is `left_first + 1`" node layout is what lets the compact
//! node format store only `left_first` instead of two child pointers.

use crate::core::config::BvhConfig;
use crate::core::types::Vec3;
use crate::math::Aabb;
use rayon::prelude::*;

use super::node::BvhNode;
use super::triangle::{GpuTriangle, Triangle};

/// Build output: a flat node array, the reordered triangle-index array, and
/// a GPU-laid-out triangle buffer in *original* (unreordered) order — the
/// index array is the indirection between the two.
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub tri_indices: Vec<u32>,
    pub gpu_triangles: Vec<GpuTriangle>,
    /// `false` for a zero-triangle build (`InvalidBVHInput`): renderers
    /// must tolerate this rather than treat it as an error.
    pub built: bool,
}

impl Bvh {
    /// The `InvalidBVHInput` early-return case: no triangles, no tree.
    pub fn empty() -> Self {
        Self { nodes: Vec::new(), tri_indices: Vec::new(), gpu_triangles: Vec::new(), built: false }
    }

    pub fn build(triangles: &[Triangle], cfg: &BvhConfig) -> Self {
        if triangles.is_empty() {
            log::info!("bvh build: zero triangles, leaving unbuilt");
            return Self::empty();
        }

        let start = std::time::Instant::now();
        let mut indices: Vec<u32> = (0..triangles.len() as u32).collect();
        let mut nodes = vec![BvhNode::leaf(Aabb::new(Vec3::ZERO, Vec3::ZERO), 0, 0)];

        build_node(&mut nodes, 0, 0, &mut indices, triangles, cfg);

        let gpu_triangles = triangles.iter().map(GpuTriangle::from).collect();
        log::info!(
            "bvh build: {} triangles, {} nodes, {:.2}ms",
            triangles.len(),
            nodes.len(),
            start.elapsed().as_secs_f64() * 1000.0,
        );

        Self { nodes, tri_indices: indices, gpu_triangles, built: true }
    }

    pub fn root_aabb(&self) -> Option<Aabb> {
        self.nodes.first().map(BvhNode::aabb)
    }

    pub fn depth(&self) -> u32 {
        if !self.built {
            return 0;
        }
        fn walk(nodes: &[BvhNode], idx: usize) -> u32 {
            let n = &nodes[idx];
            if n.is_leaf() {
                1
            } else {
                1 + walk(nodes, n.left_child() as usize).max(walk(nodes, n.right_child() as usize))
            }
        }
        walk(&self.nodes, 0)
    }
}

fn component(v: Vec3, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn compute_aabb(indices: &[u32], triangles: &[Triangle]) -> Aabb {
    let mut aabb = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
    for &i in indices {
        aabb = aabb.merged(&triangles[i as usize].aabb);
    }
    aabb
}

struct SplitCandidate {
    axis: usize,
    pos: f32,
    cost: f32,
}

/// Evaluate 16-bin SAH splits on one axis. Returns `None` if every triangle
/// shares the same centroid coordinate on this axis (no valid split exists).
fn evaluate_axis(
    indices: &[u32],
    triangles: &[Triangle],
    axis: usize,
    bins: usize,
    parent_area: f32,
    cfg: &BvhConfig,
) -> Option<SplitCandidate> {
    let (mut lo, mut hi) = (f32::MAX, f32::MIN);
    for &i in indices {
        let c = component(triangles[i as usize].centroid, axis);
        lo = lo.min(c);
        hi = hi.max(c);
    }
    if hi - lo < f32::EPSILON {
        return None;
    }
    let scale = bins as f32 / (hi - lo);

    let mut bin_count = vec![0u32; bins];
    let mut bin_aabb = vec![Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)); bins];

    for &i in indices {
        let t = &triangles[i as usize];
        let c = component(t.centroid, axis);
        let bin = (((c - lo) * scale) as usize).min(bins - 1);
        bin_count[bin] += 1;
        bin_aabb[bin] = bin_aabb[bin].merged(&t.aabb);
    }

    let mut left_count = vec![0u32; bins];
    let mut left_area = vec![0f32; bins];
    let mut acc_count = 0u32;
    let mut acc_aabb = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
    for i in 0..bins {
        acc_count += bin_count[i];
        acc_aabb = acc_aabb.merged(&bin_aabb[i]);
        left_count[i] = acc_count;
        left_area[i] = acc_aabb.surface_area();
    }

    let mut right_count = vec![0u32; bins];
    let mut right_area = vec![0f32; bins];
    acc_count = 0;
    acc_aabb = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
    for i in (0..bins).rev() {
        acc_count += bin_count[i];
        acc_aabb = acc_aabb.merged(&bin_aabb[i]);
        right_count[i] = acc_count;
        right_area[i] = acc_aabb.surface_area();
    }

    let mut best: Option<SplitCandidate> = None;
    for i in 0..bins - 1 {
        let n_l = left_count[i];
        let n_r = right_count[i + 1];
        if n_l == 0 || n_r == 0 {
            continue;
        }
        let cost = cfg.traversal_cost
            + (left_area[i] / parent_area * n_l as f32 + right_area[i + 1] / parent_area * n_r as f32)
                * cfg.intersection_cost;
        if best.as_ref().is_none_or(|b| cost < b.cost) {
            let pos = lo + (i + 1) as f32 / bins as f32 * (hi - lo);
            best = Some(SplitCandidate { axis, pos, cost });
        }
    }
    best
}

/// Binned SAH over all three axes, evaluated in parallel with `rayon`,
/// one task per axis.
fn find_best_split(
    indices: &[u32],
    triangles: &[Triangle],
    parent_aabb: &Aabb,
    cfg: &BvhConfig,
) -> Option<SplitCandidate> {
    let parent_area = parent_aabb.surface_area();
    let bins = cfg.sah_bins as usize;
    (0..3usize)
        .into_par_iter()
        .filter_map(|axis| evaluate_axis(indices, triangles, axis, bins, parent_area, cfg))
        .reduce_with(|a, b| if a.cost <= b.cost { a } else { b })
}

/// Two-pointer partition of `indices` by `centroid[axis] < split_pos`.
/// Returns the count routed left. Falls back to a median split on the same
/// axis if the SAH split turns out degenerate (all triangles land on one
/// side) — this can happen when bin boundaries don't align with where the
/// triangles actually sit, and a degenerate partition would otherwise
/// recurse forever on an unchanged index set.
fn partition(indices: &mut [u32], triangles: &[Triangle], axis: usize, split_pos: f32) -> usize {
    let mut i = 0usize;
    let mut j = indices.len();
    while i < j {
        if component(triangles[indices[i] as usize].centroid, axis) < split_pos {
            i += 1;
        } else {
            j -= 1;
            indices.swap(i, j);
        }
    }
    if i == 0 || i == indices.len() {
        indices.sort_by(|&a, &b| {
            component(triangles[a as usize].centroid, axis)
                .partial_cmp(&component(triangles[b as usize].centroid, axis))
                .unwrap()
        });
        return indices.len() / 2;
    }
    i
}

fn build_node(
    nodes: &mut Vec<BvhNode>,
    node_idx: usize,
    offset: u32,
    indices: &mut [u32],
    triangles: &[Triangle],
    cfg: &BvhConfig,
) {
    let aabb = compute_aabb(indices, triangles);
    let n = indices.len();

    if n as u32 <= cfg.max_tris_per_leaf {
        nodes[node_idx] = BvhNode::leaf(aabb, offset, n as u32);
        return;
    }

    let leaf_cost = cfg.leaf_cost_fraction * n as f32 * cfg.intersection_cost;
    let split = find_best_split(indices, triangles, &aabb, cfg).filter(|s| s.cost < leaf_cost);

    let Some(split) = split else {
        nodes[node_idx] = BvhNode::leaf(aabb, offset, n as u32);
        return;
    };

    let mid = partition(indices, triangles, split.axis, split.pos);

    let left_idx = nodes.len();
    nodes.push(BvhNode::leaf(aabb, 0, 0));
    nodes.push(BvhNode::leaf(aabb, 0, 0));
    nodes[node_idx] = BvhNode::interior(aabb, left_idx as u32);

    let (left, right) = indices.split_at_mut(mid);
    build_node(nodes, left_idx, offset, left, triangles, cfg);
    build_node(nodes, left_idx + 1, offset + mid as u32, right, triangles, cfg);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube_triangles(offset: Vec3) -> Vec<Triangle> {
        // Two triangles per cube face, 12 total - enough to exercise a
        // non-trivial leaf without building a full mesh loader.
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
            [0, 1, 2], [0, 2, 3], // -z
            [4, 6, 5], [4, 7, 6], // +z
            [0, 4, 5], [0, 5, 1], // -y
            [3, 2, 6], [3, 6, 7], // +y
            [0, 3, 7], [0, 7, 4], // -x
            [1, 5, 6], [1, 6, 2], // +x
        ];
        faces
            .iter()
            .map(|f| {
                Triangle::new(
                    corners[f[0]] + offset,
                    corners[f[1]] + offset,
                    corners[f[2]] + offset,
                    Vec3::ONE,
                    0.0,
                    32.0,
                    0,
                )
            })
            .collect()
    }

    fn grid_scene() -> Vec<Triangle> {
        // 12 unit cubes on a 4x3 grid in the XZ plane -> 144 triangles.
        let mut tris = Vec::new();
        for gx in 0..4 {
            for gz in 0..3 {
                tris.extend(grid_cube_offset(gx, gz));
            }
        }
        tris
    }

    fn grid_cube_offset(gx: i32, gz: i32) -> Vec<Triangle> {
        unit_cube_triangles(Vec3::new(gx as f32 * 3.0, 0.0, gz as f32 * 3.0))
    }

    #[test]
    fn test_empty_build_is_not_built() {
        let bvh = Bvh::build(&[], &BvhConfig::default());
        assert!(!bvh.built);
        assert!(bvh.nodes.is_empty());
    }

    #[test]
    fn test_single_cube_builds_one_leaf_or_small_tree() {
        let tris = unit_cube_triangles(Vec3::ZERO);
        let bvh = Bvh::build(&tris, &BvhConfig::default());
        assert!(bvh.built);
        for n in &bvh.nodes {
            if n.is_leaf() {
                assert!(n.tri_count <= BvhConfig::default().max_tris_per_leaf);
            }
        }
    }

    #[test]
    fn test_every_triangle_covered_exactly_once() {
        let tris = grid_scene();
        let bvh = Bvh::build(&tris, &BvhConfig::default());

        let mut covered = vec![0u32; tris.len()];
        for n in &bvh.nodes {
            if n.is_leaf() {
                let start = n.first_tri_index() as usize;
                let end = start + n.tri_count as usize;
                for &orig in &bvh.tri_indices[start..end] {
                    covered[orig as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "every triangle must appear in exactly one leaf");
    }

    #[test]
    fn test_sibling_invariant_holds() {
        let tris = grid_scene();
        let bvh = Bvh::build(&tris, &BvhConfig::default());
        for n in &bvh.nodes {
            if !n.is_leaf() {
                assert_eq!(n.right_child(), n.left_child() + 1);
            }
        }
    }

    #[test]
    fn test_leaf_count_bounded() {
        let tris = grid_scene();
        let cfg = BvhConfig::default();
        let bvh = Bvh::build(&tris, &cfg);
        assert!(bvh.depth() <= (144f32 / 4.0).log2().ceil() as u32 + 2);
        for n in &bvh.nodes {
            if n.is_leaf() {
                assert!(n.tri_count <= cfg.max_tris_per_leaf);
            }
        }
    }

    #[test]
    fn test_node_aabb_contains_its_triangles() {
        let tris = grid_scene();
        let bvh = Bvh::build(&tris, &BvhConfig::default());

        fn check(bvh: &Bvh, triangles: &[Triangle], idx: usize) -> Aabb {
            let n = &bvh.nodes[idx];
            let bound = n.aabb();
            if n.is_leaf() {
                let start = n.first_tri_index() as usize;
                for &orig in &bvh.tri_indices[start..start + n.tri_count as usize] {
                    let t = &triangles[orig as usize];
                    assert!(bound.contains_point(t.v0) || (t.v0 - bound.min).min_element() >= -1e-4);
                }
            } else {
                check(bvh, triangles, n.left_child() as usize);
                check(bvh, triangles, n.right_child() as usize);
            }
            bound
        }
        check(&bvh, &tris, 0);
    }
}
