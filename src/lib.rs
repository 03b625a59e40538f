//! Strata - an out-of-core spatial data engine
//!
//! Two acceleration structures over spatial data, built for scenes whose
//! raw size exceeds available RAM:
//!
//! - [`point_cloud`]: an octree-backed point cloud manager with a disk-backed
//!   point store, LRU memory budgeting, level-of-detail generation, and an
//!   asynchronous background loader.
//! - [`bvh`]: a surface-area-heuristic bounding volume hierarchy builder over
//!   triangle soups, with a flat GPU-friendly node layout and scene-change
//!   invalidation tracking.

pub mod core;
pub mod math;
pub mod point_cloud;
pub mod bvh;
pub mod scene;
