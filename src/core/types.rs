//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3, Vec4,
    Mat3, Mat4,
    Quat,
    IVec3, UVec3,
};

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Stable, monotonically assigned identifier for an octree node.
///
/// Used as the on-disk filename key (`node_<id>.bin`) and as the join point
/// between the octree, the point store, and the async loader's in-flight set.
pub type NodeId = u64;
