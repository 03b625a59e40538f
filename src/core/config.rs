//! Engine configuration
//!
//! Every tunable eviction threshold, LOD distance, and BVH cost constant
//! lives here as a named, overridable field rather than a literal scattered
//! through the implementation. Every field carries `#[serde(default)]` so
//! a partial JSON config still deserializes.

use serde::{Deserialize, Serialize};

/// Point store and memory-budget policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Soft cap on total resident point bytes.
    pub max_bytes: u64,
    /// Leaves beyond this per-node point count are split further.
    pub max_points_per_node: usize,
    /// Points per node used instead, when the raw input is large.
    pub large_input_points_per_node: usize,
    /// Maximum octree depth; a node at this depth is always a leaf.
    pub max_depth: u32,
    /// `ensure_within_budget` evicts down to this fraction of `max_bytes`.
    pub eviction_target_fraction: f32,
    /// Build-time aggressive eviction triggers once resident bytes exceed
    /// this fraction of `max_bytes` after a child finishes.
    pub build_eviction_trigger_fraction: f32,
    /// Build-time aggressive eviction target fraction.
    pub build_eviction_target_fraction: f32,
    /// Raw input size, as a fraction of `max_bytes`, above which
    /// `large_input_points_per_node` replaces `max_points_per_node`.
    pub large_input_trigger_fraction: f32,
    /// Upper bound on failing eviction candidates visited per `evict_to` call.
    pub max_eviction_failures: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_bytes: 8192 * 1024 * 1024,
            max_points_per_node: 5000,
            large_input_points_per_node: 1000,
            max_depth: 12,
            eviction_target_fraction: 0.8,
            build_eviction_trigger_fraction: 0.9,
            build_eviction_target_fraction: 0.3,
            large_input_trigger_fraction: 0.9,
            max_eviction_failures: 8,
        }
    }
}

/// Level-of-detail selection and point-size policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Distance bands used to pick a render LOD and a subdivide threshold.
    pub lod_distances: [f32; 5],
    /// Scales every distance comparison; larger values pull detail closer.
    pub lod_multiplier: f32,
    /// Base point size in pixels before LOD and density scaling.
    pub base_point_size: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            lod_distances: [10.0, 25.0, 50.0, 100.0, 200.0],
            lod_multiplier: 1.0,
            base_point_size: 2.0,
        }
    }
}

/// Async loader worker pool policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Explicit worker count; `None` derives `max(2, hw_concurrency / 2)`.
    pub worker_count: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { worker_count: None }
    }
}

/// SAH BVH build policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BvhConfig {
    pub max_tris_per_leaf: u32,
    pub sah_bins: u32,
    pub traversal_cost: f32,
    pub intersection_cost: f32,
    /// A split is accepted only if its cost is below
    /// `leaf_cost_fraction * n * intersection_cost`.
    pub leaf_cost_fraction: f32,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_tris_per_leaf: 4,
            sah_bins: 16,
            traversal_cost: 1.25,
            intersection_cost: 1.0,
            leaf_cost_fraction: 0.95,
        }
    }
}

/// Top-level engine configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory point-cloud node files are read from and written to.
    pub cache_dir: std::path::PathBuf,
    pub streaming: StreamingConfig,
    pub lod: LodConfig,
    pub loader: LoaderConfig,
    pub bvh: BvhConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::path::PathBuf::from("point_cache"),
            streaming: StreamingConfig::default(),
            lod: LodConfig::default(),
            loader: LoaderConfig::default(),
            bvh: BvhConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a JSON string; missing fields fall back to defaults.
    pub fn from_json(s: &str) -> crate::core::Result<Self> {
        serde_json::from_str(s).map_err(|e| crate::core::Error::Format(e.to_string()))
    }

    pub fn to_json(&self) -> crate::core::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::core::Error::Format(e.to_string()))
    }
}
