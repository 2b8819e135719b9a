//! Frame transformer: per-frame filter pipeline over a reused output pool
//!
//! Every failure degrades to returning the input frame unchanged; nothing
//! in here stops the stream. One transformer per stream: calls are
//! expected serially, which is why the pool needs no locking.

use crate::error::{FailureKind, FilterFailure, TransformError};
use crate::filter::ImageFilter;
use crate::image::{Image, Rect};
use crate::render::RenderContext;
use std::fmt;
use std::sync::Arc;
use vf_video::{
    BufferPoolAllocator, ColorSpace, Frame, FrameDescriptor, OutputBufferPool, PixelAllocator,
    VideoError, DEFAULT_RETAINED_BUFFER_COUNT,
};

/// Transformer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerConfig {
    /// Buffers retained (and pre-warmed) per output pool
    pub retained_buffer_count: usize,
    pub prewarm: bool,
    /// Frames to wait before retrying a descriptor whose pool creation failed
    pub pool_retry_interval: u32,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            retained_buffer_count: DEFAULT_RETAINED_BUFFER_COUNT,
            prewarm: true,
            pool_retry_interval: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub frames_in: u64,
    pub frames_filtered: u64,
    pub passed_through: u64,
    pub pools_created: u64,
    failures: [u64; FailureKind::ALL.len()],
}

impl TransformStats {
    /// Frames that failed at `kind`
    pub fn failures(&self, kind: FailureKind) -> u64 {
        self.failures[kind.index()]
    }
}

#[derive(Debug)]
struct PoolFailure {
    descriptor: FrameDescriptor,
    frames_since: u32,
}

/// The one output pool of a stream, rebuilt on format change
struct PoolSlot {
    allocator: BufferPoolAllocator,
    retained: usize,
    retry_interval: u32,
    current: Option<OutputBufferPool>,
    failure: Option<PoolFailure>,
    created: u64,
}

impl PoolSlot {
    fn new(allocator: BufferPoolAllocator, config: &TransformerConfig) -> Self {
        Self {
            allocator: allocator.with_prewarm(config.prewarm),
            retained: config.retained_buffer_count,
            retry_interval: config.pool_retry_interval,
            current: None,
            failure: None,
            created: 0,
        }
    }

    /// Pool serving `descriptor`, created or replaced as needed
    fn ensure(&mut self, descriptor: &FrameDescriptor) -> Result<&OutputBufferPool, TransformError> {
        if let Some(pool) = self.current.take() {
            if pool.serves(descriptor) {
                return Ok(self.current.insert(pool));
            }
            // Buffers still held downstream free their storage when released
            log::info!(
                "Input format changed from {} {}x{} to {} {}x{}, replacing output pool",
                pool.descriptor().pixel_format,
                pool.descriptor().width,
                pool.descriptor().height,
                descriptor.pixel_format,
                descriptor.width,
                descriptor.height
            );
        }

        self.check_backoff(descriptor)?;

        match self.allocator.allocate(descriptor, self.retained) {
            Ok(pool) => {
                self.failure = None;
                self.created += 1;
                Ok(self.current.insert(pool))
            }
            Err(e) => {
                self.failure = Some(PoolFailure {
                    descriptor: descriptor.clone(),
                    frames_since: 0,
                });
                Err(TransformError::PoolCreation(e))
            }
        }
    }

    fn check_backoff(&mut self, descriptor: &FrameDescriptor) -> Result<(), TransformError> {
        let Some(failure) = self.failure.as_mut() else {
            return Ok(());
        };
        if &failure.descriptor != descriptor {
            return Ok(());
        }

        failure.frames_since = failure.frames_since.saturating_add(1);
        if failure.frames_since >= self.retry_interval {
            return Ok(());
        }
        Err(TransformError::PoolBackoff {
            remaining: self.retry_interval - failure.frames_since,
        })
    }

    fn reset(&mut self) {
        self.current = None;
        self.failure = None;
    }
}

/// Runs an [`ImageFilter`] over a stream of frames
///
/// ```
/// use vf_render::{FrameTransformer, IdentityFilter};
/// use vf_video::{BufferAttributes, Frame, MediaTime, PixelBuffer, PixelFormat};
///
/// let mut transformer = FrameTransformer::new(IdentityFilter);
/// let buffer = PixelBuffer::new(BufferAttributes::new(PixelFormat::Nv12, 64, 64)).unwrap();
/// let input = Frame::new(buffer, MediaTime::new(1, 30));
///
/// let output = transformer.transform(input.clone());
/// assert!(!output.ptr_eq(&input));
/// assert_eq!(output.presentation_timestamp(), input.presentation_timestamp());
/// ```
pub struct FrameTransformer {
    config: TransformerConfig,
    pools: PoolSlot,
    filter: Option<Box<dyn ImageFilter>>,
    render: RenderContext,
    source: Image,
    stats: TransformStats,
    last_failure: Option<FailureKind>,
}

impl FrameTransformer {
    pub fn new(filter: impl ImageFilter + 'static) -> Self {
        let mut transformer = Self::without_filter();
        transformer.set_filter(filter);
        transformer
    }

    /// Transformer with no filter installed; every frame passes through
    pub fn without_filter() -> Self {
        let config = TransformerConfig::default();
        Self {
            pools: PoolSlot::new(BufferPoolAllocator::default(), &config),
            config,
            filter: None,
            render: RenderContext::new(),
            source: Image::new(Rect::default(), ColorSpace::default()),
            stats: TransformStats::default(),
            last_failure: None,
        }
    }

    /// Replace the configuration; drops the current output pool
    pub fn with_config(mut self, config: TransformerConfig) -> Self {
        self.pools = PoolSlot::new(self.pools.allocator.clone(), &config);
        self.config = config;
        self
    }

    /// Build output pools through `allocator`; drops the current output pool
    pub fn with_allocator(mut self, allocator: Arc<dyn PixelAllocator>) -> Self {
        self.pools = PoolSlot::new(BufferPoolAllocator::new(allocator), &self.config);
        self
    }

    pub fn set_filter(&mut self, filter: impl ImageFilter + 'static) {
        log::debug!("Installed filter '{}'", filter.name());
        self.filter = Some(Box::new(filter));
    }

    pub fn clear_filter(&mut self) -> Option<Box<dyn ImageFilter>> {
        self.filter.take()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Filter one frame, or hand back `input` unchanged if any step fails
    pub fn transform(&mut self, input: Frame) -> Frame {
        match self.try_transform(&input) {
            Ok(output) => output,
            Err(e) => {
                self.stats.passed_through += 1;
                let kind = e.kind();
                if self.last_failure == Some(kind) {
                    log::debug!("Passing frame through: {}", e);
                } else {
                    log::warn!("Passing frame through: {}", e);
                }
                self.last_failure = Some(kind);
                input
            }
        }
    }

    /// Filter one frame, reporting which step failed
    pub fn try_transform(&mut self, input: &Frame) -> Result<Frame, TransformError> {
        self.stats.frames_in += 1;
        match self.run(input) {
            Ok(output) => {
                self.stats.frames_filtered += 1;
                self.last_failure = None;
                Ok(output)
            }
            Err(e) => {
                self.stats.failures[e.kind().index()] += 1;
                Err(e)
            }
        }
    }

    fn run(&mut self, input: &Frame) -> Result<Frame, TransformError> {
        let buffer = input.pixel_buffer().ok_or(TransformError::MissingBuffer)?;
        let pts = input.presentation_timestamp();
        if !pts.is_valid() {
            // Could never be wrapped; skip decode, filter and render
            return Err(TransformError::Wrap(VideoError::InvalidTimestamp(pts)));
        }
        let format = input
            .format_description()
            .map_err(TransformError::MissingFormat)?;
        let descriptor = FrameDescriptor::extract(&format);

        let pool = self.pools.ensure(&descriptor)?;

        let filter = self.filter.as_mut().ok_or(FilterFailure::Missing)?;
        self.source
            .load_pixel_buffer(buffer)
            .map_err(FilterFailure::Input)?;
        let filtered = filter.apply(&self.source).ok_or(FilterFailure::NoOutput)?;

        let output = pool
            .acquire()
            .map_err(TransformError::BufferAcquisition)?;
        log::trace!("Acquired output buffer, pool {:?}", pool.stats());

        self.render
            .render(&filtered, &output, filtered.extent(), pool.color_space())
            .map_err(TransformError::Render)?;

        pool.verify(&output).map_err(TransformError::Wrap)?;
        Frame::wrap(output, pts).map_err(TransformError::Wrap)
    }

    /// Pool currently used for output, if one has been built
    pub fn output_pool(&self) -> Option<&OutputBufferPool> {
        self.pools.current.as_ref()
    }

    /// Drop the output pool; the next frame builds a fresh one
    pub fn reset_pool(&mut self) {
        self.pools.reset();
    }

    pub fn stats(&self) -> TransformStats {
        TransformStats {
            pools_created: self.pools.created,
            ..self.stats
        }
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn frames_rendered(&self) -> u64 {
        self.render.frames_rendered()
    }
}

impl Default for FrameTransformer {
    fn default() -> Self {
        Self::without_filter()
    }
}

impl fmt::Debug for FrameTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTransformer")
            .field("config", &self.config)
            .field("filter", &self.filter.as_ref().map(|filter| filter.name()))
            .field("output_pool", &self.pools.current)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IdentityFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vf_video::error::Result;
    use vf_video::{
        BufferAttributes, BufferLayout, MediaTime, PixelBuffer, PixelFormat, PixelStorage,
        PoolAttributes,
    };

    #[derive(Default)]
    struct Refusing {
        attempts: AtomicUsize,
    }

    impl PixelAllocator for Refusing {
        fn check_pool(&self, _: &PoolAttributes, _: &BufferAttributes) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(VideoError::PoolCreation("refused".into()))
        }

        fn allocate(&self, _: &BufferAttributes, layout: &BufferLayout) -> Result<PixelStorage> {
            PixelStorage::try_zeroed(layout.size())
        }
    }

    fn frame(format: PixelFormat, width: u32, height: u32, pts: i64) -> Frame {
        let buffer = PixelBuffer::new(BufferAttributes::new(format, width, height)).unwrap();
        Frame::new(buffer, MediaTime::new(pts, 30))
    }

    #[test]
    fn test_config_defaults() {
        let config = TransformerConfig::default();
        assert_eq!(config.retained_buffer_count, 3);
        assert!(config.prewarm);
        assert_eq!(config.pool_retry_interval, 30);
    }

    #[test]
    fn test_stats_count_each_outcome() {
        let mut transformer = FrameTransformer::new(IdentityFilter);

        transformer.transform(frame(PixelFormat::Bgra, 16, 16, 0));
        transformer.transform(Frame::without_buffer(MediaTime::new(1, 30)));
        transformer.transform(frame(PixelFormat::Bgra, 16, 16, 2));

        let stats = transformer.stats();
        assert_eq!(stats.frames_in, 3);
        assert_eq!(stats.frames_filtered, 2);
        assert_eq!(stats.passed_through, 1);
        assert_eq!(stats.pools_created, 1);
        assert_eq!(stats.failures(FailureKind::MissingBuffer), 1);
        assert_eq!(transformer.frames_rendered(), 2);
    }

    #[test]
    fn test_no_filter_is_filter_failure() {
        let mut transformer = FrameTransformer::without_filter();
        let result = transformer.try_transform(&frame(PixelFormat::Nv12, 32, 32, 0));

        assert!(matches!(
            result,
            Err(TransformError::Filter(FilterFailure::Missing))
        ));
        assert!(!transformer.has_filter());
    }

    #[test]
    fn test_failed_descriptor_backs_off() {
        let refusing = Arc::new(Refusing::default());
        let mut transformer = FrameTransformer::new(IdentityFilter)
            .with_config(TransformerConfig {
                pool_retry_interval: 3,
                ..TransformerConfig::default()
            })
            .with_allocator(refusing.clone());

        let input = frame(PixelFormat::Bgra, 8, 8, 0);
        assert!(matches!(
            transformer.try_transform(&input),
            Err(TransformError::PoolCreation(_))
        ));
        assert!(matches!(
            transformer.try_transform(&input),
            Err(TransformError::PoolBackoff { remaining: 2 })
        ));
        assert!(matches!(
            transformer.try_transform(&input),
            Err(TransformError::PoolBackoff { remaining: 1 })
        ));
        assert_eq!(refusing.attempts.load(Ordering::SeqCst), 1);

        // Interval elapsed: retried
        assert!(matches!(
            transformer.try_transform(&input),
            Err(TransformError::PoolCreation(_))
        ));
        assert_eq!(refusing.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(transformer.stats().failures(FailureKind::PoolCreation), 4);
    }

    #[test]
    fn test_new_descriptor_skips_backoff() {
        let refusing = Arc::new(Refusing::default());
        let mut transformer = FrameTransformer::new(IdentityFilter).with_allocator(refusing.clone());

        transformer.transform(frame(PixelFormat::Bgra, 8, 8, 0));
        transformer.transform(frame(PixelFormat::Bgra, 16, 8, 1));

        assert_eq!(refusing.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_pool_rebuilds() {
        let mut transformer = FrameTransformer::new(IdentityFilter);
        transformer.transform(frame(PixelFormat::I420, 32, 32, 0));
        assert!(transformer.output_pool().is_some());

        transformer.reset_pool();
        assert!(transformer.output_pool().is_none());

        transformer.transform(frame(PixelFormat::I420, 32, 32, 1));
        assert_eq!(transformer.stats().pools_created, 2);
    }

    #[test]
    fn test_clear_filter_returns_it() {
        let mut transformer = FrameTransformer::new(IdentityFilter);
        let filter = transformer.clear_filter().unwrap();

        assert_eq!(filter.name(), "identity");
        let input = frame(PixelFormat::Bgra, 8, 8, 0);
        assert!(transformer.transform(input.clone()).ptr_eq(&input));
    }
}
