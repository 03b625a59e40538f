//! A surface-area-heuristic BVH over triangle soups, with a flat
//! GPU-friendly node layout and ray traversal for tests/tools.

pub mod builder;
pub mod node;
pub mod traverse;
pub mod triangle;

pub use builder::Bvh;
pub use node::BvhNode;
pub use traverse::{intersect, Hit};
pub use triangle::{GpuTriangle, Triangle};
