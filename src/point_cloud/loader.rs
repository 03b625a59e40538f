//! The async loader — a fixed pool of blocking worker threads.
//!
//! Spawned `std::thread` workers block on a `Condvar`-guarded FIFO queue,
//! with an in-flight set guarded by a plain mutex and no async runtime.
//! The loader's defining operation — a synchronous, mutex-held file read —
//! has no natural `.await` point, so plain blocking threads fit better
//! here than a task scheduler would.
//!
//! Workers never touch an `OctreeNode` directly. A finished load is handed
//! back as a [`LoadedResult`] (owned `node_id` + `points`); the main thread
//! applies it with [`crate::point_cloud::octree::Octree::apply_loaded`].
//! This keeps a node mutated by one actor at a time without any raw
//! pointer changing hands between threads.

use crate::core::config::LoaderConfig;
use crate::core::types::NodeId;
use crate::point_cloud::point::Point;
use crate::point_cloud::store;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

struct LoadTask {
    node_id: NodeId,
    disk_path: PathBuf,
    total_point_count: usize,
}

/// A completed load, ready to be applied to its node by the main thread.
pub struct LoadedResult {
    pub node_id: NodeId,
    pub points: Vec<Point>,
}

struct Shared {
    queue: Mutex<VecDeque<LoadTask>>,
    queue_cond: Condvar,
    in_flight: Mutex<HashSet<NodeId>>,
    completed: Mutex<Vec<LoadedResult>>,
    shutdown: AtomicBool,
}

/// A process-wide service: one queue, one worker set, started explicitly
/// via [`AsyncLoader::init`] and stopped via [`AsyncLoader::shutdown`].
/// No lazy/implicit static initialization — the worker lifecycle must stay
/// observable.
pub struct AsyncLoader {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncLoader {
    /// Start `max(2, hw_concurrency / 2)` worker threads, or `cfg.worker_count`
    /// if explicitly set.
    pub fn init(cfg: &LoaderConfig) -> Self {
        let worker_count = cfg.worker_count.unwrap_or_else(|| {
            let hw = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
            (hw / 2).max(2)
        });

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queue_cond: Condvar::new(),
            in_flight: Mutex::new(HashSet::new()),
            completed: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|i| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("point-store-loader-{i}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn point store loader thread")
            })
            .collect();

        log::info!("async loader: started {worker_count} worker threads");
        Self { shared, workers }
    }

    /// Enqueue a load. Idempotent: a no-op if the node is already in flight.
    /// The caller is responsible for checking `is_loaded`/`is_on_disk`
    /// before calling (the octree traversal does this).
    pub fn enqueue(&self, node_id: NodeId, disk_path: PathBuf, total_point_count: usize, _cache_dir: PathBuf) -> bool {
        {
            let mut in_flight = self.shared.in_flight.lock().unwrap();
            if !in_flight.insert(node_id) {
                return false; // already in flight
            }
        }
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(LoadTask { node_id, disk_path, total_point_count });
        self.shared.queue_cond.notify_one();
        log::debug!("async loader: enqueued node {node_id}");
        true
    }

    pub fn is_in_flight(&self, node_id: NodeId) -> bool {
        self.shared.in_flight.lock().unwrap().contains(&node_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().unwrap().len()
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Called once per frame by the traversal driver: pop whatever
    /// completed since the last call.
    pub fn drain_completed(&self) -> Vec<LoadedResult> {
        std::mem::take(&mut *self.shared.completed.lock().unwrap())
    }

    /// Drain the queue and join all workers. No cancellation: in-flight
    /// tasks run to completion; no new enqueues are serviced after this
    /// returns (workers have exited).
    pub fn shutdown(mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.queue_cond.notify_all();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
        log::info!("async loader: shut down");
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared.queue_cond.wait(queue).unwrap();
            }
        };

        let Some(task) = task else { break };

        match store::load(&task.disk_path, task.total_point_count) {
            Ok(points) => {
                shared.completed.lock().unwrap().push(LoadedResult { node_id: task.node_id, points });
            }
            Err(e) => {
                // Load failure is reported but never propagates: the node
                // simply remains unloaded and may be re-enqueued.
                log::warn!("async loader: load of node {} failed: {e}", task.node_id);
            }
        }

        shared.in_flight.lock().unwrap().remove(&task.node_id);
    }
}
