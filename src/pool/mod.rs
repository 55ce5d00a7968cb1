//! Shared slab pool for transient work buffers
//!
//! Process-wide pool of `Vec<f64>` slabs keyed by power-of-two size
//! bucket, reused for the approximation/detail/input scratch of the
//! denoise engine. Lifecycle is governed by explicit user counting:
//! pipelines register on creation and release on close; `clear_if_unused`
//! is a no-op while any user is alive.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::constants::DEFAULT_MAX_ARRAYS_PER_SIZE;

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolStats {
    pub acquires: AtomicU64,
    pub releases: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

/// Point-in-time copy of the pool counters
#[derive(Debug, Clone, Copy)]
pub struct PoolStatsSnapshot {
    pub acquires: u64,
    pub releases: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Reference-counted slab allocator for `f64` work buffers.
pub struct SharedPool {
    buckets: Mutex<HashMap<usize, VecDeque<Vec<f64>>>>,
    max_per_size: usize,
    users: AtomicUsize,
    stats: PoolStats,
}

impl SharedPool {
    pub fn new(max_per_size: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_per_size,
            users: AtomicUsize::new(0),
            stats: PoolStats::default(),
        }
    }

    /// Borrow a zeroed slab of `n` samples. The backing allocation is the
    /// next power of two so slabs are reusable across nearby sizes.
    pub fn acquire(self: &Arc<Self>, n: usize) -> SlabHandle {
        let bucket = n.next_power_of_two().max(1);
        self.stats.acquires.fetch_add(1, Ordering::Relaxed);

        let recycled = self.buckets.lock().get_mut(&bucket).and_then(VecDeque::pop_front);
        let mut buf = match recycled {
            Some(buf) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(bucket)
            }
        };
        buf.clear();
        buf.resize(n, 0.0);

        SlabHandle {
            buf: Some(buf),
            bucket,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, bucket: usize, buf: Vec<f64>) {
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
        let mut buckets = self.buckets.lock();
        let list = buckets.entry(bucket).or_default();
        if list.len() < self.max_per_size {
            list.push_back(buf);
        }
        // Otherwise the slab drops; retention is capped per bucket.
    }

    /// Register an active user (e.g. a pipeline built with the shared
    /// pool). Returns the new user count.
    pub fn register_user(&self) -> usize {
        self.users.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Release an active user. Returns the remaining user count.
    pub fn release_user(&self) -> usize {
        let previous = self.users.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "release_user without matching register");
        previous - 1
    }

    pub fn active_users(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    /// Drop all retained slabs, but only when no user is alive. Returns
    /// whether anything was cleared.
    pub fn clear_if_unused(&self) -> bool {
        if self.active_users() > 0 {
            return false;
        }
        self.buckets.lock().clear();
        true
    }

    /// Slabs currently retained across all buckets
    pub fn retained_slabs(&self) -> usize {
        self.buckets.lock().values().map(VecDeque::len).sum()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            acquires: self.stats.acquires.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }
}

static GLOBAL_POOL: Lazy<Arc<SharedPool>> =
    Lazy::new(|| Arc::new(SharedPool::new(DEFAULT_MAX_ARRAYS_PER_SIZE)));

/// The process-wide pool shared by pipelines built with
/// `use_shared_pool = true`.
pub fn global_pool() -> Arc<SharedPool> {
    Arc::clone(&GLOBAL_POOL)
}

/// A slab borrowed from a [`SharedPool`]; returns itself on drop.
pub struct SlabHandle {
    buf: Option<Vec<f64>>,
    bucket: usize,
    pool: Arc<SharedPool>,
}

impl Deref for SlabHandle {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        self.buf.as_deref().expect("slab present until drop")
    }
}

impl DerefMut for SlabHandle {
    fn deref_mut(&mut self) -> &mut [f64] {
        self.buf.as_deref_mut().expect("slab present until drop")
    }
}

impl Drop for SlabHandle {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(self.bucket, buf);
        }
    }
}

/// Work buffer that is pooled when a shared pool is configured and plain
/// heap otherwise.
pub enum ScratchBuf {
    Pooled(SlabHandle),
    Owned(Vec<f64>),
}

impl ScratchBuf {
    /// Allocate `n` zeroed samples from `pool` when present.
    pub fn alloc(pool: Option<&Arc<SharedPool>>, n: usize) -> Self {
        match pool {
            Some(pool) => Self::Pooled(pool.acquire(n)),
            None => Self::Owned(vec![0.0; n]),
        }
    }
}

impl Deref for ScratchBuf {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        match self {
            Self::Pooled(slab) => &slab[..],
            Self::Owned(vec) => &vec[..],
        }
    }
}

impl DerefMut for ScratchBuf {
    fn deref_mut(&mut self) -> &mut [f64] {
        match self {
            Self::Pooled(slab) => &mut slab[..],
            Self::Owned(vec) => &mut vec[..],
        }
    }
}
