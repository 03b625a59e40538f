//! The octree itself — construction and view-dependent traversal.
//!
//! Nodes live in a flat arena (`Octree::nodes`), indexed by `node_id`. This
//! is what lets the async loader hand a finished load back to the
//! main thread as plain owned data instead of a pointer into someone else's
//! tree: applying a completed load is just `nodes[node_id] = ...`.

use crate::core::config::{LodConfig, StreamingConfig};
use crate::point_cloud::budget::{AccessClock, MemoryBudget};
use crate::point_cloud::cache;
use crate::point_cloud::loader::AsyncLoader;
use crate::point_cloud::node::{OctreeNode, LOD_LEVELS};
use crate::point_cloud::point::Point;
use crate::point_cloud::store;
use glam::Vec3;
use std::path::{Path, PathBuf};

/// Owns the node arena, the shared memory budget, and the cache directory.
pub struct Octree {
    pub nodes: Vec<OctreeNode>,
    pub root: Option<usize>,
    pub cache_dir: PathBuf,
    pub budget: MemoryBudget,
    pub clock: AccessClock,
}

impl Octree {
    /// Build a tree from a flat point set. Non-negotiable about memory:
    /// leaf payloads are written to disk and unloaded the moment they're
    /// created, so peak resident memory stays bounded regardless of input
    /// size. Returns an empty tree (`root = None`) for an empty input —
    /// not an error (`EmptyInput`).
    pub fn build(
        mut points: Vec<Point>,
        cache_dir: impl AsRef<Path>,
        streaming: &StreamingConfig,
    ) -> crate::core::Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        store::create_cache_dir(&cache_dir)?;

        let mut tree = Self {
            nodes: Vec::new(),
            root: None,
            cache_dir,
            budget: MemoryBudget::new(streaming.max_bytes),
            clock: AccessClock::new(),
        };

        if points.is_empty() {
            log::info!("octree build: empty input, producing empty tree");
            return Ok(tree);
        }

        let raw_bytes = (points.len() * Point::SIZE_BYTES) as u64;
        let max_points_per_node = if raw_bytes as f64
            > streaming.max_bytes as f64 * streaming.large_input_trigger_fraction as f64
        {
            log::info!(
                "octree build: raw input ({raw_bytes} bytes) exceeds {:.0}% of budget, shrinking leaves",
                streaming.large_input_trigger_fraction * 100.0
            );
            streaming.large_input_points_per_node
        } else {
            streaming.max_points_per_node
        };

        let (min, max) = bounds_with_padding(&points);
        let center = (min + max) * 0.5;
        let half_extent = Vec3::splat(((max - min).max_element() * 0.5).max(f32::MIN_POSITIVE));

        let indices: Vec<usize> = (0..points.len()).collect();
        log::info!(
            "octree build: {} points, max_points_per_node={max_points_per_node}, max_depth={}",
            points.len(), streaming.max_depth
        );

        let root_idx = tree.build_recursive(&points, indices, center, half_extent, 0, max_points_per_node, streaming)?;
        tree.root = Some(root_idx);

        points.clear();
        points.shrink_to_fit();

        log::info!("octree build: done, resident bytes = {}", tree.budget.used());
        Ok(tree)
    }

    fn build_recursive(
        &mut self,
        points: &[Point],
        indices: Vec<usize>,
        center: Vec3,
        half_extent: Vec3,
        depth: u32,
        max_points_per_node: usize,
        streaming: &StreamingConfig,
    ) -> crate::core::Result<usize> {
        let node_id = self.nodes.len() as u64;
        let idx = self.nodes.len();
        self.nodes.push(OctreeNode::new(node_id, depth, center, half_extent));
        self.nodes[idx].total_point_count = indices.len();

        let make_leaf = indices.len() <= max_points_per_node || depth == streaming.max_depth;

        if make_leaf {
            let leaf_points: Vec<Point> = indices.iter().map(|&i| points[i]).collect();
            self.nodes[idx].is_leaf = true;
            self.nodes[idx].generate_lod_counts();

            let path = store::save(&self.cache_dir, node_id, &leaf_points)?;
            let node = &mut self.nodes[idx];
            node.is_on_disk = true;
            node.disk_path = Some(path);
            node.is_loaded = false;
            node.memory_bytes = 0;
            // leaf_points dropped here: build must not retain payloads.
        } else {
            self.nodes[idx].is_leaf = false;
            let mut buckets: [Vec<usize>; 8] = Default::default();
            for &i in &indices {
                let octant = self.nodes[idx].child_octant_for(points[i].position.into());
                buckets[octant as usize].push(i);
            }

            for (octant, bucket) in buckets.into_iter().enumerate() {
                if bucket.is_empty() {
                    continue;
                }
                let child_aabb = self.nodes[idx].child_aabb(octant as u8);
                let child_idx = self.build_recursive(
                    points,
                    bucket,
                    child_aabb.center(),
                    child_aabb.half_extent(),
                    depth + 1,
                    max_points_per_node,
                    streaming,
                )?;
                self.nodes[idx].children[octant] = Some(child_idx);

                if self.budget.exceeds_fraction(streaming.build_eviction_trigger_fraction) {
                    log::warn!(
                        "octree build: resident bytes exceeded {:.0}% of budget, evicting aggressively",
                        streaming.build_eviction_trigger_fraction * 100.0
                    );
                    let target = (self.budget.max_bytes() as f64
                        * streaming.build_eviction_target_fraction as f64) as u64;
                    cache::evict_to(&mut self.nodes, child_idx, &self.budget, &self.cache_dir, target, streaming.max_eviction_failures);
                }
            }
        }

        Ok(idx)
    }

    /// Per-frame view-dependent traversal. Requests loads through `loader`
    /// for nodes selected for rendering but not yet resident; never blocks
    /// on completion.
    pub fn update_lod(&mut self, camera: Vec3, lod: &LodConfig, loader: &AsyncLoader) {
        if let Some(root) = self.root {
            update_lod_recursive(&mut self.nodes, root, camera, lod, loader, &self.cache_dir, &self.clock);
        }
    }

    /// Per-frame render traversal. Returns the set of (node_id, lod_level)
    /// pairs that would be drawn this frame; actual GPU submission is
    /// outside this crate's scope.
    pub fn render_visible(&mut self, camera: Vec3, lod: &LodConfig, base_point_size: f32) -> Vec<RenderItem> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            render_visible_recursive(&mut self.nodes, root, camera, lod, base_point_size, &mut out);
        }
        out
    }

    pub fn ensure_within_budget(&mut self, streaming: &StreamingConfig) {
        if let Some(root) = self.root {
            if self.budget.over_budget() {
                let target = (self.budget.max_bytes() as f64 * streaming.eviction_target_fraction as f64) as u64;
                cache::evict_to(&mut self.nodes, root, &self.budget, &self.cache_dir, target, streaming.max_eviction_failures);
            }
        }
    }

    /// Apply a completed async load: publish `points`/`memory_bytes`/
    /// `is_loaded` together so a subsequent traversal sees a consistent
    /// resident state.
    pub fn apply_loaded(&mut self, node_id: crate::core::types::NodeId, points: Vec<Point>) {
        let idx = node_id as usize;
        if idx >= self.nodes.len() {
            return;
        }
        let bytes = (points.len() * Point::SIZE_BYTES) as u64;
        let node = &mut self.nodes[idx];
        node.points = points;
        node.memory_bytes = bytes;
        node.clear_gpu_state();
        node.is_loaded = true;
        node.mark_accessed(self.clock.tick());
        self.budget.add(bytes);
    }
}

/// A node selected for rendering at a specific LOD level this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    pub node_id: u64,
    pub lod_level: usize,
    pub point_size: f32,
}

fn bounds_with_padding(points: &[Point]) -> (Vec3, Vec3) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for p in points {
        let v: Vec3 = p.position.into();
        min = min.min(v);
        max = max.max(v);
    }
    let pad = (max - min) * 0.05; // 10% padding total, 5% each side
    (min - pad, max + pad)
}

fn density_mul(rho: f32) -> f32 {
    if rho > 500.0 { 1.8 } else if rho > 100.0 { 1.4 } else if rho < 20.0 { 0.6 } else { 1.0 }
}

fn nearest_point_distance(node: &OctreeNode, camera: Vec3) -> f32 {
    let aabb = node.aabb();
    let clamped = camera.clamp(aabb.min, aabb.max);
    (camera - clamped).length()
}

fn subdivide_threshold(node: &OctreeNode, lod: &LodConfig) -> f32 {
    let rho = node.adjusted_density();
    let size_mul = (node.half_extent.length() / 5.0).clamp(0.2, 3.0);
    let depth_mul = 1.0 + 0.15 * node.depth as f32;
    lod.lod_distances[2] * size_mul * density_mul(rho) * depth_mul
}

fn update_lod_recursive(
    nodes: &mut Vec<OctreeNode>,
    idx: usize,
    camera: Vec3,
    lod: &LodConfig,
    loader: &AsyncLoader,
    cache_dir: &Path,
    clock: &AccessClock,
) {
    let d = nearest_point_distance(&nodes[idx], camera) / lod.lod_multiplier.max(f32::MIN_POSITIVE);
    if d > lod.lod_distances[4] * 2.0 {
        return; // cull subtree entirely
    }

    let subdivide = !nodes[idx].is_leaf && d < subdivide_threshold(&nodes[idx], lod);

    if subdivide {
        let children = nodes[idx].children;
        for child in children.into_iter().flatten() {
            update_lod_recursive(nodes, child, camera, lod, loader, cache_dir, clock);
        }
        return;
    }

    let node = &mut nodes[idx];
    node.mark_accessed(clock.tick());
    if !node.is_loaded && node.is_on_disk {
        loader.enqueue(node.node_id, node.disk_path.clone().unwrap(), node.total_point_count, cache_dir.to_path_buf());
    } else if node.is_loaded && !node.vbos_generated {
        node.vbos_generated = true;
    }
}

fn render_visible_recursive(
    nodes: &mut Vec<OctreeNode>,
    idx: usize,
    camera: Vec3,
    lod: &LodConfig,
    base_point_size: f32,
    out: &mut Vec<RenderItem>,
) {
    let d = nearest_point_distance(&nodes[idx], camera) / lod.lod_multiplier.max(f32::MIN_POSITIVE);
    if d > lod.lod_distances[4] * 2.0 {
        return;
    }

    let subdivide = !nodes[idx].is_leaf && d < subdivide_threshold(&nodes[idx], lod);

    if subdivide {
        let children = nodes[idx].children;
        for child in children.into_iter().flatten() {
            render_visible_recursive(nodes, child, camera, lod, base_point_size, out);
        }
        return;
    }

    if nodes[idx].is_leaf {
        render_leaf_at_distance(nodes, idx, d, lod, base_point_size, out);
    } else {
        // Internal node chosen to stop subdividing: render whatever loaded
        // leaf descendants exist, at the LOD this node's own distance
        // implies, rather than dropping the whole subtree for a frame.
        // Best-effort progressive refinement; a missing leaf contributes
        // nothing this frame.
        render_leaf_descendants(nodes, idx, d, lod, base_point_size, out);
    }
}

/// Render a single loaded leaf at the LOD level implied by `d`. `d` may come
/// from an ancestor that stopped subdividing, not from this leaf's own
/// distance — see [`render_leaf_descendants`].
fn render_leaf_at_distance(
    nodes: &mut Vec<OctreeNode>,
    idx: usize,
    d: f32,
    lod: &LodConfig,
    base_point_size: f32,
    out: &mut Vec<RenderItem>,
) {
    if !nodes[idx].is_loaded {
        return;
    }

    let level = (0..LOD_LEVELS).find(|&i| d < lod.lod_distances[i]).unwrap_or(LOD_LEVELS - 1);
    let rho = nodes[idx].adjusted_density();
    if level > 0 {
        nodes[idx].ensure_lod_indices(level);
    }

    let point_size = (base_point_size * (1.0 + 1.2 * level as f32) * density_mul(rho)).clamp(1.0, 25.0);
    out.push(RenderItem { node_id: nodes[idx].node_id, lod_level: level, point_size });
}

/// Recurse from an internal node that stopped subdividing down to every leaf
/// descendant, rendering whichever are loaded at the stopping node's
/// distance `d`. Unloaded leaves are silently skipped, not waited on.
fn render_leaf_descendants(
    nodes: &mut Vec<OctreeNode>,
    idx: usize,
    d: f32,
    lod: &LodConfig,
    base_point_size: f32,
    out: &mut Vec<RenderItem>,
) {
    if nodes[idx].is_leaf {
        render_leaf_at_distance(nodes, idx, d, lod, base_point_size, out);
        return;
    }
    let children = nodes[idx].children;
    for child in children.into_iter().flatten() {
        render_leaf_descendants(nodes, child, d, lod, base_point_size, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StreamingConfig;

    fn uniform_cube_points(n: usize, seed: u64) -> Vec<Point> {
        let mut rng_state = seed;
        let mut next = move || {
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((rng_state >> 33) as f64 / (1u64 << 31) as f64) as f32
        };
        (0..n)
            .map(|_| Point::new([next(), next(), next()], 1.0, [1.0, 1.0, 1.0]))
            .collect()
    }

    #[test]
    fn test_build_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StreamingConfig::default();
        let tree = Octree::build(vec![], dir.path(), &cfg).unwrap();
        assert!(tree.root.is_none());
    }

    #[test]
    fn test_build_is_memory_bounded_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = StreamingConfig::default();
        cfg.max_points_per_node = 200;
        cfg.max_depth = 8;
        cfg.max_bytes = 64 * 1024 * 1024;

        let points = uniform_cube_points(20_000, 42);
        let tree = Octree::build(points.clone(), dir.path(), &cfg).unwrap();

        // build must not retain leaf payloads
        assert_eq!(tree.budget.used(), 0);

        let mut total_on_disk = 0usize;
        let mut stack = vec![tree.root.unwrap()];
        while let Some(idx) = stack.pop() {
            let n = &tree.nodes[idx];
            if n.is_leaf {
                assert!(n.is_on_disk);
                let path = n.disk_path.as_ref().unwrap();
                let loaded = store::load(path, n.total_point_count).unwrap();
                assert_eq!(loaded.len(), n.total_point_count);
                total_on_disk += loaded.len();
            } else {
                for c in n.children.iter().flatten() {
                    stack.push(*c);
                }
            }
        }
        assert_eq!(total_on_disk, points.len());
    }

    #[test]
    fn test_sum_property_holds() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = StreamingConfig::default();
        cfg.max_points_per_node = 50;
        cfg.max_depth = 6;

        let points = uniform_cube_points(5_000, 7);
        let tree = Octree::build(points, dir.path(), &cfg).unwrap();

        fn check(nodes: &[OctreeNode], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.is_leaf {
                return node.total_point_count;
            }
            let sum: usize = node.children.iter().flatten().map(|&c| check(nodes, c)).sum();
            assert_eq!(sum, node.total_point_count);
            sum
        }
        check(&tree.nodes, tree.root.unwrap());
    }

    #[test]
    fn test_memory_cap_honored_after_touching_every_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = StreamingConfig::default();
        cfg.max_points_per_node = 500;
        cfg.max_depth = 6;
        cfg.max_bytes = 64 * 1024 * 1024;

        let points = uniform_cube_points(50_000, 99);
        let mut tree = Octree::build(points, dir.path(), &cfg).unwrap();
        assert_eq!(tree.budget.used(), 0);

        // touch every leaf directly, as the async loader would
        let mut stack = vec![tree.root.unwrap()];
        while let Some(idx) = stack.pop() {
            let (is_leaf, node_id, total, path, children) = {
                let n = &tree.nodes[idx];
                (n.is_leaf, n.node_id, n.total_point_count, n.disk_path.clone(), n.children)
            };
            if is_leaf {
                let loaded = store::load(path.as_ref().unwrap(), total).unwrap();
                tree.apply_loaded(node_id, loaded);
                tree.ensure_within_budget(&cfg);
            } else {
                for c in children.into_iter().flatten() {
                    stack.push(c);
                }
            }
        }

        assert!(tree.budget.used() <= cfg.max_bytes);
    }

    #[test]
    fn test_render_leaf_descendants_skips_unloaded_and_keeps_stopping_distance() {
        use crate::core::config::LodConfig;

        // root (internal, stopped subdividing) -> [loaded leaf, unloaded leaf]
        let mut root = OctreeNode::new(0, 0, Vec3::ZERO, Vec3::splat(2.0));
        root.is_leaf = false;

        let mut loaded_leaf = OctreeNode::new(1, 1, Vec3::new(-1.0, 0.0, 0.0), Vec3::splat(1.0));
        loaded_leaf.total_point_count = 10;
        loaded_leaf.is_loaded = true;
        loaded_leaf.points = (0..10).map(|i| Point::new([i as f32, 0.0, 0.0], 1.0, [1.0; 3])).collect();
        loaded_leaf.generate_lod_counts();

        let mut unloaded_leaf = OctreeNode::new(2, 1, Vec3::new(1.0, 0.0, 0.0), Vec3::splat(1.0));
        unloaded_leaf.total_point_count = 10;
        unloaded_leaf.is_loaded = false;

        root.children[0] = Some(1);
        root.children[1] = Some(2);
        let mut nodes = vec![root, loaded_leaf, unloaded_leaf];

        let lod = LodConfig::default();
        let mut out = Vec::new();
        // a distance that would land in level 2 if used for LOD selection
        let d = (lod.lod_distances[1] + lod.lod_distances[2]) / 2.0;
        render_leaf_descendants(&mut nodes, 0, d, &lod, 5.0, &mut out);

        // only the loaded leaf renders; the unloaded one contributes nothing
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].node_id, 1);
        let expected_level = (0..LOD_LEVELS).find(|&i| d < lod.lod_distances[i]).unwrap_or(LOD_LEVELS - 1);
        assert_eq!(out[0].lod_level, expected_level);
    }
}
