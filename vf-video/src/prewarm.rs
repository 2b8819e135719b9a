//! Pool pre-warming
//!
//! Pulls buffers out of a fresh pool until it reports exhaustion, then
//! returns them all, so the allocator pays for `threshold` buffers up front
//! instead of on the first frames of a stream.

use crate::frame_pool::FramePool;

/// Materialize up to `threshold` buffers in `pool`
///
/// Returns how many buffers were held at once before the pool refused.
/// Terminates because every held buffer counts against the pool's ceiling.
pub fn prewarm(pool: &FramePool, threshold: usize) -> usize {
    let mut held = Vec::with_capacity(threshold);

    loop {
        match pool.acquire_with_threshold(threshold) {
            Ok(buffer) => held.push(buffer),
            Err(e) if e.is_exhaustion() => break,
            Err(e) => {
                log::warn!("Pre-warm stopped after {} buffers: {}", held.len(), e);
                break;
            }
        }
    }

    let warmed = held.len();
    // Every buffer goes back to the free list here
    drop(held);

    log::debug!(
        "Pre-warmed pool {} {}x{}: {} buffers",
        pool.attributes().pixel_format,
        pool.attributes().width,
        pool.attributes().height,
        warmed
    );
    warmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferAttributes, BufferLayout, PixelStorage};
    use crate::error::{Result, VideoError};
    use crate::frame_pool::{HeapAllocator, PixelAllocator, PoolAttributes};
    use crate::types::PixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_prewarm_fills_to_threshold() {
        let pool = FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes::with_count(3),
            BufferAttributes::new(PixelFormat::Nv12, 1920, 1080),
        )
        .unwrap();

        assert_eq!(prewarm(&pool, 3), 3);

        let stats = pool.stats();
        assert_eq!(stats.allocated, 3);
        assert_eq!(stats.available, 3);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn test_prewarm_is_idempotent() {
        let pool = FramePool::new(
            Arc::new(HeapAllocator),
            PoolAttributes::with_count(2),
            BufferAttributes::new(PixelFormat::Bgra, 32, 32),
        )
        .unwrap();

        prewarm(&pool, 2);
        prewarm(&pool, 2);

        assert_eq!(pool.stats().total_allocations, 2);
    }

    struct FailsAfter {
        remaining: AtomicUsize,
    }

    impl PixelAllocator for FailsAfter {
        fn allocate(&self, _: &BufferAttributes, layout: &BufferLayout) -> Result<PixelStorage> {
            let left = self.remaining.load(Ordering::SeqCst);
            if left == 0 {
                return Err(VideoError::Allocation("out of memory".into()));
            }
            self.remaining.store(left - 1, Ordering::SeqCst);
            PixelStorage::try_zeroed(layout.size())
        }
    }

    #[test]
    fn test_prewarm_stops_on_allocation_error() {
        let pool = FramePool::new(
            Arc::new(FailsAfter {
                remaining: AtomicUsize::new(1),
            }),
            PoolAttributes::with_count(3),
            BufferAttributes::new(PixelFormat::Bgra, 16, 16),
        )
        .unwrap();

        assert_eq!(prewarm(&pool, 3), 1);
        assert_eq!(pool.stats().allocated, 1);
    }
}
