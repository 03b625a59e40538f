//! The octree node and its per-leaf LOD generation.

use crate::core::types::NodeId;
use crate::math::Aabb;
use crate::point_cloud::point::Point;
use glam::Vec3;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of LOD levels stored per leaf. `[0]` is always the full point set.
pub const LOD_LEVELS: usize = 5;

/// Density-keyed LOD retention tables, checked in ascending order of their
/// density-band upper bound.
const LOD_TABLE: [(f32, [f32; LOD_LEVELS]); 5] = [
    (10.0, [1.00, 1.00, 0.90, 0.80, 0.70]),
    (50.0, [1.00, 0.90, 0.70, 0.50, 0.30]),
    (200.0, [1.00, 0.70, 0.40, 0.20, 0.08]),
    (1000.0, [1.00, 0.50, 0.20, 0.05, 0.01]),
    (f32::INFINITY, [1.00, 0.30, 0.08, 0.015, 0.003]),
];

/// One octree node. Internal nodes never carry `points`; leaves cycle
/// between {on-disk only}, {on-disk + resident}, {on-disk + resident + GPU}.
///
/// Nodes live in a single arena ([`super::octree::Octree::nodes`]) indexed
/// by `node_id`; children are referenced by arena index rather than by
/// owned pointer. This sidesteps passing raw pointers to worker threads:
/// the async loader hands back owned data keyed by `node_id`, which the
/// main thread applies with a plain index lookup — no unsafe code needed to
/// get a load result back onto its node. Dropping the arena drops the whole
/// tree as a unit; there are still no parent back-references.
pub struct OctreeNode {
    pub node_id: NodeId,
    pub depth: u32,
    pub center: Vec3,
    pub half_extent: Vec3,
    pub total_point_count: usize,
    pub is_leaf: bool,
    pub children: [Option<usize>; 8],

    pub points: Vec<Point>,
    pub lod_counts: [usize; LOD_LEVELS],
    /// Subsample indices per level, generated lazily on first render visit.
    /// `[0]` is never populated: level 0 always uses the full `points` vector.
    pub lod_indices: [Option<Vec<u32>>; LOD_LEVELS],

    pub is_on_disk: bool,
    pub disk_path: Option<PathBuf>,
    pub is_loaded: bool,
    pub memory_bytes: u64,
    pub last_accessed_ts: AtomicU64,
    pub vbos_generated: bool,
}

impl OctreeNode {
    pub fn new(node_id: NodeId, depth: u32, center: Vec3, half_extent: Vec3) -> Self {
        Self {
            node_id,
            depth,
            center,
            half_extent,
            total_point_count: 0,
            is_leaf: true,
            children: Default::default(),
            points: Vec::new(),
            lod_counts: [0; LOD_LEVELS],
            lod_indices: Default::default(),
            is_on_disk: false,
            disk_path: None,
            is_loaded: false,
            memory_bytes: 0,
            last_accessed_ts: AtomicU64::new(0),
            vbos_generated: false,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, self.half_extent)
    }

    pub fn volume(&self) -> f32 {
        let size = self.half_extent * 2.0;
        (size.x * size.y * size.z).max(f32::MIN_POSITIVE)
    }

    /// Octant a point belongs to under this node, tie-broken by `>=`.
    pub fn child_octant_for(&self, p: Vec3) -> u8 {
        let mut idx = 0u8;
        if p.x >= self.center.x { idx |= 1; }
        if p.y >= self.center.y { idx |= 2; }
        if p.z >= self.center.z { idx |= 4; }
        idx
    }

    pub fn child_aabb(&self, index: u8) -> Aabb {
        self.aabb().child_octant(index)
    }

    pub fn last_accessed(&self) -> u64 {
        self.last_accessed_ts.load(Ordering::Relaxed)
    }

    pub fn mark_accessed(&self, tick: u64) {
        self.last_accessed_ts.store(tick, Ordering::Relaxed);
    }

    /// Density in points per unit volume, depth-adjusted.
    pub fn adjusted_density(&self) -> f32 {
        let rho = self.total_point_count as f32 / self.volume();
        rho * (1.0 + 0.1 * self.depth as f32)
    }

    /// Populate `lod_counts` from `total_point_count` and the node's density.
    /// Called once, when a leaf is first populated with its full point set.
    pub fn generate_lod_counts(&mut self) {
        let rho = self.adjusted_density();
        let factors = LOD_TABLE
            .iter()
            .find(|(bound, _)| rho < *bound)
            .map(|(_, f)| *f)
            .unwrap_or(LOD_TABLE[LOD_TABLE.len() - 1].1);

        let total = self.total_point_count;
        let small_leaf = total <= 20;

        for i in 0..LOD_LEVELS {
            let mut count = ((total as f32) * factors[i]).floor() as usize;
            if small_leaf {
                count = count.max(((total as f32) * 0.3).floor() as usize);
            }
            self.lod_counts[i] = count.max(1).min(total.max(1));
        }
        self.lod_counts[0] = total;
    }

    /// Lazily build the index subsample for LOD level `level` (1..5) via a
    /// Fisher-Yates prefix shuffle seeded deterministically from `node_id`,
    /// so the same leaf always yields the same subsample across runs.
    pub fn ensure_lod_indices(&mut self, level: usize) {
        debug_assert!(level > 0 && level < LOD_LEVELS);
        if self.lod_indices[level].is_some() {
            return;
        }
        let count = self.lod_counts[level].min(self.points.len());
        let mut indices: Vec<u32> = (0..self.points.len() as u32).collect();
        let mut rng = SplitMix64::new(self.node_id ^ (level as u64).wrapping_mul(0x9E3779B97F4A7C15));
        fisher_yates_prefix(&mut indices, count, &mut rng);
        indices.truncate(count);
        self.lod_indices[level] = Some(indices);
    }

    pub fn clear_gpu_state(&mut self) {
        self.vbos_generated = false;
        for slot in self.lod_indices.iter_mut() {
            *slot = None;
        }
    }
}

/// Shuffle a prefix of `indices` of length `prefix_len` into uniform random
/// order in place (partial Fisher-Yates), leaving the remainder untouched.
fn fisher_yates_prefix(indices: &mut [u32], prefix_len: usize, rng: &mut SplitMix64) {
    let n = indices.len();
    let prefix_len = prefix_len.min(n);
    for i in 0..prefix_len {
        let j = i + (rng.next_u64() as usize % (n - i));
        indices.swap(i, j);
    }
}

/// Small, fast, seedable PRNG used only for deterministic LOD subsampling.
/// Not cryptographic; reproducibility, not unpredictability, is the goal.
struct SplitMix64(u64);

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}
