//! Output pool construction keyed to a frame descriptor

use crate::buffer::PixelBuffer;
use crate::descriptor::FrameDescriptor;
use crate::error::{Result, VideoError};
use crate::frame_pool::{FramePool, HeapAllocator, PixelAllocator, PoolAttributes, PoolStats};
use crate::prewarm::prewarm;
use crate::types::{ColorSpace, FormatDescription};
use std::sync::Arc;

/// Buffers retained per pool: absorbs producer/consumer jitter without growing
pub const DEFAULT_RETAINED_BUFFER_COUNT: usize = 3;

/// A warmed pool of output buffers for one descriptor, plus its color space
#[derive(Debug)]
pub struct OutputBufferPool {
    descriptor: FrameDescriptor,
    pool: FramePool,
    color_space: ColorSpace,
    output_format: FormatDescription,
    prewarmed: usize,
}

impl OutputBufferPool {
    pub fn descriptor(&self) -> &FrameDescriptor {
        &self.descriptor
    }

    pub fn frame_pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn color_space(&self) -> &ColorSpace {
        &self.color_space
    }

    /// Format description of the buffers this pool hands out
    pub fn output_format(&self) -> &FormatDescription {
        &self.output_format
    }

    /// Buffers materialized before first use
    pub fn prewarmed(&self) -> usize {
        self.prewarmed
    }

    pub fn serves(&self, descriptor: &FrameDescriptor) -> bool {
        &self.descriptor == descriptor
    }

    pub fn acquire(&self) -> Result<PixelBuffer> {
        self.pool.acquire()
    }

    /// Check a buffer against the pool's natural output format
    pub fn verify(&self, buffer: &PixelBuffer) -> Result<()> {
        let got = buffer.format_description()?;
        let expected = &self.output_format;
        if got == *expected {
            return Ok(());
        }
        Err(VideoError::FormatMismatch {
            expected: expected.pixel_format,
            width: expected.width,
            height: expected.height,
            got: got.pixel_format,
            got_width: got.width,
            got_height: got.height,
        })
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Builds [`OutputBufferPool`]s through an injected allocator
#[derive(Clone)]
pub struct BufferPoolAllocator {
    allocator: Arc<dyn PixelAllocator>,
    prewarm: bool,
}

impl BufferPoolAllocator {
    pub fn new(allocator: Arc<dyn PixelAllocator>) -> Self {
        Self {
            allocator,
            prewarm: true,
        }
    }

    pub fn with_prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    /// Create and pre-warm a pool for `descriptor`
    ///
    /// On error nothing is retained; the caller should pass its input through.
    pub fn allocate(
        &self,
        descriptor: &FrameDescriptor,
        retained_count_hint: usize,
    ) -> Result<OutputBufferPool> {
        let pool = FramePool::new(
            self.allocator.clone(),
            PoolAttributes::with_count(retained_count_hint),
            descriptor.buffer_attributes(),
        )?;
        let color_space = descriptor.color_space();

        let prewarmed = if self.prewarm {
            prewarm(&pool, retained_count_hint)
        } else {
            0
        };

        // Throwaway buffer: learn the pool's natural format, then hand it back
        let output_format = {
            let probe = pool.acquire()?;
            probe.format_description()?
        };

        log::info!(
            "Created output pool {} {}x{} ({:?}), {} buffers pre-warmed",
            descriptor.pixel_format,
            descriptor.width,
            descriptor.height,
            color_space,
            prewarmed
        );

        Ok(OutputBufferPool {
            descriptor: descriptor.clone(),
            pool,
            color_space,
            output_format,
            prewarmed,
        })
    }
}

impl Default for BufferPoolAllocator {
    fn default() -> Self {
        Self::new(Arc::new(HeapAllocator))
    }
}
