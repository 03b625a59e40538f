//! The memory budget. Pressure/capacity tracking lives here; the LRU
//! eviction walk that acts on that pressure is in [`super::cache`].
//!
//! Tracks a single resource, resident point bytes (this engine does not
//! track a separate GPU byte budget, only a per-node "buffers generated"
//! flag), kept atomic so worker threads can report freed/claimed bytes
//! without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks total resident point bytes against a soft cap.
pub struct MemoryBudget {
    max_bytes: u64,
    used_bytes: AtomicU64,
}

impl MemoryBudget {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes, used_bytes: AtomicU64::new(0) }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn used(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> u64 {
        self.max_bytes.saturating_sub(self.used())
    }

    pub fn add(&self, bytes: u64) {
        self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn remove(&self, bytes: u64) {
        self.used_bytes.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |u| {
            Some(u.saturating_sub(bytes))
        }).ok();
    }

    /// 0.0..1.0+; values above 1.0 mean over budget.
    pub fn pressure(&self) -> f32 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.used() as f32 / self.max_bytes as f32
    }

    pub fn over_budget(&self) -> bool {
        self.used() > self.max_bytes
    }

    /// True once resident bytes exceed `fraction * max_bytes`.
    pub fn exceeds_fraction(&self, fraction: f32) -> bool {
        self.used() as f64 > self.max_bytes as f64 * fraction as f64
    }
}

/// Logical access clock: a monotonic tick counter standing in for wall-clock
/// `last_accessed_ts`, for reproducible LRU ordering across test runs. Still
/// a racy hint, not a linearizable log: the counter is read and written with
/// relaxed ordering from multiple threads with no further synchronization.
#[derive(Default)]
pub struct AccessClock(AtomicU64);

impl AccessClock {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Advance and return the new tick, to be stored as a node's timestamp.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
