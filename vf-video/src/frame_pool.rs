//! Bounded pool of reusable pixel buffers
//!
//! Buffers are recycled into a lock-free free list when their last handle
//! drops. The pool never holds more than `allocation_threshold` buffers and
//! acquisition never blocks: it reuses, allocates below the ceiling, or fails.

use crate::buffer::{
    BufferAttributes, BufferLayout, PixelBuffer, PixelStorage, StorageRecycler,
};
use crate::error::{Result, VideoError};
use crossbeam_queue::ArrayQueue;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Pooled-buffer allocator capability
///
/// Production code uses [`HeapAllocator`]; tests substitute doubles that
/// count, refuse or fail allocations.
pub trait PixelAllocator: Send + Sync {
    /// Accept or refuse a pool before it is created
    fn check_pool(&self, _pool: &PoolAttributes, _buffer: &BufferAttributes) -> Result<()> {
        Ok(())
    }

    /// Materialize storage for one buffer
    fn allocate(&self, attributes: &BufferAttributes, layout: &BufferLayout)
        -> Result<PixelStorage>;
}

/// System-heap allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl PixelAllocator for HeapAllocator {
    fn allocate(
        &self,
        _attributes: &BufferAttributes,
        layout: &BufferLayout,
    ) -> Result<PixelStorage> {
        PixelStorage::try_zeroed(layout.size())
    }
}

/// Pool-level attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAttributes {
    /// Free buffers kept across [`FramePool::flush`]
    pub minimum_buffer_count: usize,
    /// Hard ceiling on buffers alive at once (free plus checked out)
    pub allocation_threshold: usize,
}

impl PoolAttributes {
    pub fn with_count(count: usize) -> Self {
        Self {
            minimum_buffer_count: count,
            allocation_threshold: count,
        }
    }
}

struct PoolShared {
    attributes: Arc<BufferAttributes>,
    layout: Arc<BufferLayout>,
    pool_attributes: PoolAttributes,
    free: ArrayQueue<PixelStorage>,
    // Storage blocks alive: free list plus checked out
    allocated: AtomicUsize,
    total_allocations: AtomicU64,
    allocator: Arc<dyn PixelAllocator>,
}

impl StorageRecycler for PoolShared {
    fn recycle(&self, storage: PixelStorage) {
        if self.free.push(storage).is_err() {
            self.allocated.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Pool of pre-allocated pixel buffers to eliminate allocation churn
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// Create a new frame pool
    ///
    /// No storage is allocated here; see [`crate::prewarm`].
    pub fn new(
        allocator: Arc<dyn PixelAllocator>,
        pool_attributes: PoolAttributes,
        attributes: BufferAttributes,
    ) -> Result<Self> {
        if pool_attributes.allocation_threshold == 0 {
            return Err(VideoError::PoolCreation(
                "allocation threshold must be at least 1".into(),
            ));
        }
        if pool_attributes.minimum_buffer_count > pool_attributes.allocation_threshold {
            return Err(VideoError::PoolCreation(format!(
                "minimum buffer count {} exceeds allocation threshold {}",
                pool_attributes.minimum_buffer_count, pool_attributes.allocation_threshold
            )));
        }

        let layout = BufferLayout::new(attributes.pixel_format, attributes.width, attributes.height)
            .ok_or_else(|| {
                VideoError::PoolCreation(format!(
                    "cannot lay out {} {}x{}",
                    attributes.pixel_format, attributes.width, attributes.height
                ))
            })?;

        allocator
            .check_pool(&pool_attributes, &attributes)
            .map_err(|e| match e {
                VideoError::PoolCreation(_) => e,
                other => VideoError::PoolCreation(other.to_string()),
            })?;

        Ok(FramePool {
            shared: Arc::new(PoolShared {
                attributes: Arc::new(attributes),
                layout: Arc::new(layout),
                pool_attributes,
                free: ArrayQueue::new(pool_attributes.allocation_threshold),
                allocated: AtomicUsize::new(0),
                total_allocations: AtomicU64::new(0),
                allocator,
            }),
        })
    }

    pub fn attributes(&self) -> &BufferAttributes {
        &self.shared.attributes
    }

    pub fn pool_attributes(&self) -> PoolAttributes {
        self.shared.pool_attributes
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.shared.layout
    }

    /// Acquire a buffer, bounded by the pool's allocation threshold
    pub fn acquire(&self) -> Result<PixelBuffer> {
        self.acquire_with_threshold(self.shared.pool_attributes.allocation_threshold)
    }

    /// Acquire a buffer without letting the pool grow past `threshold`
    ///
    /// A free buffer is always reused. Otherwise a new one is allocated if the
    /// pool holds fewer than `threshold` buffers (capped at the pool's own
    /// ceiling), else [`VideoError::WouldExceedAllocationThreshold`].
    pub fn acquire_with_threshold(&self, threshold: usize) -> Result<PixelBuffer> {
        let shared = &self.shared;

        if let Some(storage) = shared.free.pop() {
            return Ok(self.wrap(storage));
        }

        let limit = threshold.min(shared.pool_attributes.allocation_threshold);
        let reserved = shared
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });
        if reserved.is_err() {
            return self.reuse_or_exhausted(limit);
        }

        let storage = match shared.allocator.allocate(&shared.attributes, &shared.layout) {
            Ok(storage) if storage.len() >= shared.layout.size() => storage,
            Ok(storage) => {
                shared.allocated.fetch_sub(1, Ordering::AcqRel);
                return Err(VideoError::Allocation(format!(
                    "allocator returned {} bytes, layout needs {}",
                    storage.len(),
                    shared.layout.size()
                )));
            }
            Err(e) => {
                shared.allocated.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
        };

        shared.total_allocations.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "Pool allocated buffer {} of {}",
            shared.allocated.load(Ordering::Relaxed),
            limit
        );
        Ok(self.wrap(storage))
    }

    /// Pool is full: a buffer released since the first pop is still reusable
    fn reuse_or_exhausted(&self, limit: usize) -> Result<PixelBuffer> {
        match self.shared.free.pop() {
            Some(storage) => Ok(self.wrap(storage)),
            None => Err(VideoError::WouldExceedAllocationThreshold { threshold: limit }),
        }
    }

    fn wrap(&self, storage: PixelStorage) -> PixelBuffer {
        let weak: Weak<PoolShared> = Arc::downgrade(&self.shared);
        let recycler: Weak<dyn StorageRecycler> = weak;
        PixelBuffer::from_parts(
            self.shared.attributes.clone(),
            self.shared.layout.clone(),
            storage,
            Some(recycler),
        )
    }

    /// Release free buffers beyond the minimum buffer count
    ///
    /// Returns the number of buffers freed.
    pub fn flush(&self) -> usize {
        let shared = &self.shared;
        let mut freed = 0;

        while shared.free.len() > shared.pool_attributes.minimum_buffer_count {
            match shared.free.pop() {
                Some(storage) => {
                    drop(storage);
                    shared.allocated.fetch_sub(1, Ordering::AcqRel);
                    freed += 1;
                }
                None => break,
            }
        }

        freed
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let allocated = self.shared.allocated.load(Ordering::Acquire);
        let available = self.shared.free.len();

        PoolStats {
            capacity: self.shared.pool_attributes.allocation_threshold,
            allocated,
            in_use: allocated.saturating_sub(available),
            available,
            total_allocations: self.shared.total_allocations.load(Ordering::Relaxed),
        }
    }

    /// Same underlying pool
    pub fn ptr_eq(&self, other: &FramePool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("attributes", &self.shared.attributes)
            .field("pool_attributes", &self.shared.pool_attributes)
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub allocated: usize,
    pub in_use: usize,
    pub available: usize,
    /// Storage blocks ever materialized by the allocator
    pub total_allocations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn pool(format: PixelFormat, width: u32, height: u32, count: usize) -> FramePool {
        FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes::with_count(count),
            BufferAttributes::new(format, width, height),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_pool_acquire_release() {
        let pool = pool(PixelFormat::Nv12, 1920, 1080, 4);

        let stats = pool.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.allocated, 0);

        let frame1 = pool.acquire().unwrap();
        assert_eq!(pool.stats().in_use, 1);

        let frame2 = pool.acquire().unwrap();
        assert_eq!(pool.stats().in_use, 2);

        drop(frame1);
        assert_eq!(pool.stats().in_use, 1);
        assert_eq!(pool.stats().available, 1);

        drop(frame2);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().available, 2);
    }

    #[test]
    fn test_frame_pool_exhaustion() {
        let pool = pool(PixelFormat::I420, 640, 480, 2);

        let _f1 = pool.acquire().unwrap();
        let _f2 = pool.acquire().unwrap();
        let f3 = pool.acquire();

        assert!(
            matches!(f3, Err(ref e) if e.is_exhaustion()),
            "Pool should be exhausted"
        );
    }

    #[test]
    fn test_released_storage_is_reused() {
        let pool = pool(PixelFormat::Bgra, 64, 64, 2);

        let first = pool.acquire().unwrap();
        first.lock().plane_mut(0).unwrap()[0] = 7;
        drop(first);

        let second = pool.acquire().unwrap();
        assert_eq!(pool.stats().total_allocations, 1);
        assert_eq!(second.lock().plane(0).unwrap()[0], 7);
        assert!(second.is_pooled());
    }

    #[test]
    fn test_threshold_hint_caps_growth() {
        let pool = pool(PixelFormat::Bgra, 16, 16, 4);

        let _a = pool.acquire_with_threshold(1).unwrap();
        let err = pool.acquire_with_threshold(1).unwrap_err();
        assert!(matches!(
            err,
            VideoError::WouldExceedAllocationThreshold { threshold: 1 }
        ));

        // Hint above the ceiling is clamped to it
        let _b = pool.acquire_with_threshold(10).unwrap();
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn test_full_pool_reuses_late_release() {
        let pool = pool(PixelFormat::Bgra, 16, 16, 1);
        let first = pool.acquire().unwrap();

        assert!(matches!(
            pool.reuse_or_exhausted(1),
            Err(VideoError::WouldExceedAllocationThreshold { threshold: 1 })
        ));

        // Released after the free list was first checked, before reporting
        drop(first);
        let reused = pool.reuse_or_exhausted(1).unwrap();
        assert!(reused.is_pooled());
        assert_eq!(pool.stats().total_allocations, 1);
        assert_eq!(pool.stats().in_use, 1);
    }

    #[test]
    fn test_buffer_outliving_pool_is_freed() {
        let pool = pool(PixelFormat::Nv12, 32, 32, 1);
        let buffer = pool.acquire().unwrap();
        drop(pool);

        // Dropping after the pool is gone must not touch it
        assert_eq!(buffer.width(), 32);
        drop(buffer);
    }

    #[test]
    fn test_flush_keeps_minimum() {
        let pool = FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes {
                minimum_buffer_count: 1,
                allocation_threshold: 3,
            },
            BufferAttributes::new(PixelFormat::Bgra, 8, 8),
        )
        .unwrap();

        let held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        drop(held);
        assert_eq!(pool.stats().available, 3);

        assert_eq!(pool.flush(), 2);
        assert_eq!(pool.stats().available, 1);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn test_invalid_pool_attributes() {
        let zero = FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes::with_count(0),
            BufferAttributes::new(PixelFormat::Bgra, 8, 8),
        );
        assert!(matches!(zero, Err(VideoError::PoolCreation(_))));

        let unknown = FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes::with_count(2),
            BufferAttributes::new(PixelFormat::Unknown, 8, 8),
        );
        assert!(matches!(unknown, Err(VideoError::PoolCreation(_))));
    }

    #[test]
    fn test_frame_alignment() {
        let pool = pool(PixelFormat::Nv12, 1920, 1080, 1);
        let frame = pool.acquire().unwrap();
        let guard = frame.lock();

        // Check 32-byte alignment of every row for AVX2
        assert_eq!(guard.stride(0).unwrap() % 32, 0, "Y plane not aligned");
        assert_eq!(guard.stride(1).unwrap() % 32, 0, "UV plane not aligned");
    }
}
