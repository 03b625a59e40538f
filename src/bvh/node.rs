//! The flat, 32-byte BVH node.
//!
//! One union-style field, `left_first`, is disambiguated by `tri_count`:
//! zero means interior (`left_first` is the left child's node index, the
//! right child is always `left_first + 1`), nonzero means leaf
//! (`left_first` is the first index into the reordered triangle-index
//! array). `tri_count > 0` marking a leaf is the usual convention for a
//! GPU-facing flat BVH node; this one additionally carries the
//! sibling-adjacency invariant the SAH builder produces.

use crate::core::types::Vec3;
use crate::math::Aabb;
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub min: [f32; 3],
    pub left_first: u32,
    pub max: [f32; 3],
    pub tri_count: u32,
}

impl BvhNode {
    pub fn leaf(aabb: Aabb, first_tri_index: u32, tri_count: u32) -> Self {
        Self {
            min: aabb.min.into(),
            max: aabb.max.into(),
            left_first: first_tri_index,
            tri_count,
        }
    }

    pub fn interior(aabb: Aabb, left_child: u32) -> Self {
        Self { min: aabb.min.into(), max: aabb.max.into(), left_first: left_child, tri_count: 0 }
    }

    pub fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(Vec3::from(self.min), Vec3::from(self.max))
    }

    pub fn left_child(&self) -> u32 {
        debug_assert!(!self.is_leaf());
        self.left_first
    }

    pub fn right_child(&self) -> u32 {
        debug_assert!(!self.is_leaf());
        self.left_first + 1
    }

    pub fn first_tri_index(&self) -> u32 {
        debug_assert!(self.is_leaf());
        self.left_first
    }
}
