//! The scene-change fingerprint used to decide whether the BVH is stale.
//!
//! `ModelTransform` is a plain position/rotation/scale triple, compared as
//! data rather than carrying any behavior of its own. `scale` is a
//! per-axis `Vec3` rather than a single uniform factor, since this
//! engine's BVH sits over arbitrary triangle soups and non-uniform scale
//! is common for imported meshes.

use crate::core::types::{Quat, Vec3};

/// A model's placement in the scene, as far as BVH invalidation cares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl ModelTransform {
    pub fn identity() -> Self {
        Self { position: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }

    pub fn to_mat4(&self) -> crate::core::types::Mat4 {
        crate::core::types::Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Model count plus parallel position/rotation/scale vectors. Comparing two
/// fingerprints for equality is exactly the driver's dirty check: derived
/// `PartialEq` already short-circuits on a length mismatch (a changed model
/// count) before comparing a single element, so that fast path doesn't
/// need to be written out by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFingerprint {
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
}

impl SceneFingerprint {
    pub fn capture(transforms: &[ModelTransform]) -> Self {
        Self {
            positions: transforms.iter().map(|t| t.position).collect(),
            rotations: transforms.iter().map(|t| t.rotation).collect(),
            scales: transforms.iter().map(|t| t.scale).collect(),
        }
    }

    pub fn model_count(&self) -> usize {
        self.positions.len()
    }
}
