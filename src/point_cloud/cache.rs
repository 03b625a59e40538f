//! LRU eviction over the resident leaf set.
//!
//! An oldest-first scan over the octree arena rather than a standalone
//! keyed cache, since here the "cache" *is* the tree's resident leaves
//! rather than a separate store.

use crate::point_cloud::budget::MemoryBudget;
use crate::point_cloud::node::OctreeNode;
use crate::point_cloud::point::Point;
use crate::point_cloud::store;
use std::path::Path;

fn collect_loaded_leaves(nodes: &[OctreeNode], idx: usize, out: &mut Vec<usize>) {
    let node = &nodes[idx];
    if node.is_leaf {
        if node.is_loaded {
            out.push(idx);
        }
        return;
    }
    for child in node.children.iter().flatten() {
        collect_loaded_leaves(nodes, *child, out);
    }
}

/// Evict loaded leaves under the subtree rooted at `idx`, oldest
/// `last_accessed_ts` first, until `budget.used() <= target` or a run of
/// `max_failures` leaves in a row fail to save (a forward-progress guard —
/// without it, a subtree where every candidate fails to save would spin
/// forever).
pub fn evict_to(
    nodes: &mut Vec<OctreeNode>,
    idx: usize,
    budget: &MemoryBudget,
    cache_dir: &Path,
    target: u64,
    max_failures: u32,
) {
    let mut candidates = Vec::new();
    collect_loaded_leaves(nodes, idx, &mut candidates);
    candidates.sort_by_key(|&i| nodes[i].last_accessed());

    let mut failures = 0u32;
    for leaf_idx in candidates {
        if budget.used() <= target {
            break;
        }
        if failures >= max_failures {
            log::warn!("eviction: forward-progress guard tripped after {failures} failed saves, stopping this pass");
            break;
        }

        let node = &mut nodes[leaf_idx];
        if !node.is_on_disk {
            match store::save(cache_dir, node.node_id, &node.points) {
                Ok(path) => {
                    node.is_on_disk = true;
                    node.disk_path = Some(path);
                }
                Err(e) => {
                    log::warn!("eviction: save of node {} failed, leaving it resident: {e}", node.node_id);
                    failures += 1;
                    continue;
                }
            }
        }

        let freed = node.memory_bytes;
        node.points = Vec::new();
        node.clear_gpu_state();
        node.is_loaded = false;
        node.memory_bytes = 0;
        budget.remove(freed);
    }
}

/// Sum of `memory_bytes` over all loaded nodes, computed by traversal
/// rather than trusted from the running counter — used by tests to check
/// the budget's running total stays consistent with ground truth.
pub fn current_bytes(nodes: &[OctreeNode], idx: usize) -> u64 {
    let node = &nodes[idx];
    if node.is_leaf {
        return if node.is_loaded { node.memory_bytes } else { 0 };
    }
    node.children.iter().flatten().map(|&c| current_bytes(nodes, c)).sum()
}

#[allow(dead_code)]
fn points_bytes(points: &[Point]) -> u64 {
    (points.len() * Point::SIZE_BYTES) as u64
}
