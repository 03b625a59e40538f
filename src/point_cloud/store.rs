//! The on-disk point store: one file per leaf node.
//!
//! Each node's payload lives in its own file, keyed by node id; there is no
//! cross-file index. The container is an rkyv-archived record vector,
//! LZ4-compressed with a prepended size. The container itself is not part
//! of the compatibility surface; only the record schema and field order
//! (see [`super::point::Point`]) are.
//!
//! All I/O acquires [`STORE_MUTEX`] for the duration of a single node's
//! save or load: the container library is assumed non-thread-safe, so
//! workers serialize here rather than at the tree-traversal level.

use crate::core::types::NodeId;
use crate::core::{Error, Result};
use crate::point_cloud::point::Point;
use rkyv::{Archive, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Process-global store mutex. Serializes all point-store I/O.
static STORE_MUTEX: Mutex<()> = Mutex::new(());

#[derive(Archive, Deserialize, Serialize)]
struct PointRecordSet {
    records: Vec<Point>,
}

/// Path a node's payload is (or will be) stored at.
pub fn node_path(cache_dir: &Path, node_id: NodeId) -> PathBuf {
    cache_dir.join(format!("node_{node_id}.bin"))
}

/// Idempotently create the cache directory tree.
pub fn create_cache_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Write a node's points to its file. Returns the path written.
pub fn save(cache_dir: &Path, node_id: NodeId, points: &[Point]) -> Result<PathBuf> {
    let path = node_path(cache_dir, node_id);
    let _guard = STORE_MUTEX.lock().unwrap();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = PointRecordSet { records: points.to_vec() };
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&data)
        .map_err(|e| Error::Format(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&bytes);
    fs::write(&path, compressed)?;

    log::debug!("point store: saved node {node_id} ({} points) to {}", points.len(), path.display());
    Ok(path)
}

/// Read a node's points back from disk.
///
/// `expected_count` is the node's `total_point_count`; a mismatch against
/// the decoded record count is reported as [`Error::Format`], not silently
/// truncated or padded.
pub fn load(path: &Path, expected_count: usize) -> Result<Vec<Point>> {
    let _guard = STORE_MUTEX.lock().unwrap();

    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }

    let compressed = fs::read(path)?;
    let bytes = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| Error::Format(format!("lz4 decompression failed: {e}")))?;
    let archived = rkyv::access::<ArchivedPointRecordSet, rkyv::rancor::Error>(&bytes)
        .map_err(|e| Error::Format(e.to_string()))?;
    let data: PointRecordSet = rkyv::deserialize::<PointRecordSet, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Format(e.to_string()))?;

    if data.records.len() != expected_count {
        return Err(Error::Format(format!(
            "record count mismatch: file has {}, node expects {expected_count}",
            data.records.len(),
        )));
    }

    Ok(data.records)
}
