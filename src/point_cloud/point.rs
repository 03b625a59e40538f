//! The point record: wire-stable on disk and on the GPU.

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

/// A single point cloud sample.
///
/// Field order is the compatibility surface (see the point store format):
/// position, intensity, color. `Pod`/`Zeroable` let this be uploaded to the
/// GPU as-is; `Archive`/`Serialize`/`Deserialize` let a `Vec<Point>` be
/// rkyv-archived directly for the on-disk container.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct Point {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
}

impl Point {
    pub fn new(position: [f32; 3], intensity: f32, color: [f32; 3]) -> Self {
        Self { position, intensity, color }
    }

    pub const SIZE_BYTES: usize = std::mem::size_of::<Point>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_size_is_wire_stable() {
        // 3 + 1 + 3 = 7 f32 fields, contiguous, no implicit padding.
        assert_eq!(Point::SIZE_BYTES, 28);
    }

    #[test]
    fn test_pod_bytes_roundtrip() {
        let p = Point::new([1.0, 2.0, 3.0], 0.5, [0.1, 0.2, 0.3]);
        let bytes = bytemuck::bytes_of(&p);
        let back: Point = *bytemuck::from_bytes(bytes);
        assert_eq!(p, back);
    }
}
