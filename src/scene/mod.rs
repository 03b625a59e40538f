//! The coordinating facade for mesh content: tracks a set of models, each
//! with its own local-space triangle soup and world transform, and rebuilds
//! the shared BVH exactly on the frames where the scene fingerprint changes.

pub mod fingerprint;

pub use fingerprint::{ModelTransform, SceneFingerprint};

use crate::bvh::{Bvh, Triangle};
use crate::core::config::BvhConfig;

/// One placed mesh instance: untransformed geometry plus where it sits in
/// the world. `local_triangles` is the parser layer's output — already
/// turned into [`Triangle`]s in model space — since file parsing itself
/// is someone else's job.
pub struct Model {
    pub transform: ModelTransform,
    pub local_triangles: Vec<Triangle>,
}

/// Owns the placed models and the BVH built over their world-space
/// triangles. Rebuilds are driven entirely by fingerprint comparison, never
/// by a dirty flag set at mutation time, so it also catches a transform
/// mutated without going through this struct.
pub struct BvhScene {
    pub enable_bvh: bool,
    models: Vec<Model>,
    fingerprint: Option<SceneFingerprint>,
    bvh: Bvh,
}

impl BvhScene {
    pub fn new(enable_bvh: bool) -> Self {
        Self { enable_bvh, models: Vec::new(), fingerprint: None, bvh: Bvh::empty() }
    }

    pub fn set_models(&mut self, models: Vec<Model>) {
        self.models = models;
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    fn current_fingerprint(&self) -> SceneFingerprint {
        let transforms: Vec<ModelTransform> = self.models.iter().map(|m| m.transform).collect();
        SceneFingerprint::capture(&transforms)
    }

    /// Rebuild the BVH if (and only if) the scene fingerprint changed since
    /// the last call. Returns whether a rebuild happened. A no-op, `false`,
    /// result when `enable_bvh` is off — the flag exists so callers that
    /// never use mesh rendering pay nothing per frame.
    pub fn update(&mut self, cfg: &BvhConfig) -> bool {
        if !self.enable_bvh {
            return false;
        }

        let fresh = self.current_fingerprint();
        if self.fingerprint.as_ref() == Some(&fresh) {
            return false;
        }

        let world_triangles: Vec<Triangle> = self
            .models
            .iter()
            .flat_map(|m| {
                let mat = m.transform.to_mat4();
                m.local_triangles.iter().map(move |t| t.transformed(mat))
            })
            .collect();

        log::info!(
            "scene: fingerprint changed ({} models, {} triangles), rebuilding bvh",
            self.models.len(),
            world_triangles.len()
        );
        self.bvh = Bvh::build(&world_triangles, cfg);
        self.fingerprint = Some(fresh);
        true
    }
}
