//! The coordinating facade for a single point cloud: owns the cache
//! directory lifecycle and the async loader's start/stop, and applies
//! completed loads back onto the octree each frame. This is glue —
//! nothing here has policy of its own beyond wiring the pieces together
//! in the right order.

use std::path::Path;

use crate::core::config::{EngineConfig, LodConfig, StreamingConfig};
use crate::core::types::Vec3;
use crate::point_cloud::loader::AsyncLoader;
use crate::point_cloud::octree::{Octree, RenderItem};
use crate::point_cloud::point::Point;

/// A built octree plus its dedicated async loader, started together and
/// shut down together. The loader's lifecycle is explicit and owned here,
/// never a lazily-initialized static.
pub struct PointCloudService {
    pub octree: Octree,
    loader: AsyncLoader,
}

impl PointCloudService {
    /// Build a fresh octree from `points` and start its worker pool.
    pub fn build(points: Vec<Point>, cfg: &EngineConfig) -> crate::core::Result<Self> {
        let octree = Octree::build(points, &cfg.cache_dir, &cfg.streaming)?;
        let loader = AsyncLoader::init(&cfg.loader);
        Ok(Self { octree, loader })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.octree.cache_dir
    }

    /// One frame's worth of work: drain whatever loads finished since the
    /// last call, apply them to the octree, run view-dependent traversal
    /// (which may enqueue new loads), and re-check the memory budget.
    pub fn step(&mut self, camera: Vec3, lod: &LodConfig, streaming: &StreamingConfig) -> Vec<RenderItem> {
        for result in self.loader.drain_completed() {
            self.octree.apply_loaded(result.node_id, result.points);
        }

        self.octree.update_lod(camera, lod, &self.loader);
        self.octree.ensure_within_budget(streaming);

        self.octree.render_visible(camera, lod, 2.0)
    }

    pub fn loader(&self) -> &AsyncLoader {
        &self.loader
    }

    /// Drain the queue and join every worker thread.
    pub fn shutdown(self) {
        self.loader.shutdown();
    }
}
