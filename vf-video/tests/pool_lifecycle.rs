//! Pool lifecycle across allocation, pre-warming and cross-thread release

use crossbeam::channel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use vf_video::error::Result;
use vf_video::{
    BufferAttributes, BufferLayout, BufferPoolAllocator, ColorPrimaries, ColorSpace, Colorimetry,
    FormatDescription, Frame, FrameDescriptor, MediaTime, PixelAllocator, PixelFormat,
    PixelStorage, PoolAttributes, VideoError,
};

#[derive(Default)]
struct CountingAllocator {
    pools: AtomicUsize,
    buffers: AtomicUsize,
}

impl PixelAllocator for CountingAllocator {
    fn check_pool(&self, _: &PoolAttributes, _: &BufferAttributes) -> Result<()> {
        self.pools.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn allocate(&self, _: &BufferAttributes, layout: &BufferLayout) -> Result<PixelStorage> {
        self.buffers.fetch_add(1, Ordering::SeqCst);
        PixelStorage::try_zeroed(layout.size())
    }
}

struct RefusingAllocator;

impl PixelAllocator for RefusingAllocator {
    fn check_pool(&self, _: &PoolAttributes, _: &BufferAttributes) -> Result<()> {
        Err(VideoError::PoolCreation("no surfaces left".into()))
    }

    fn allocate(&self, _: &BufferAttributes, _: &BufferLayout) -> Result<PixelStorage> {
        unreachable!("refused pools never allocate")
    }
}

fn descriptor(format: PixelFormat, width: u32, height: u32) -> FrameDescriptor {
    FrameDescriptor::extract(&FormatDescription::new(format, width, height).with_extensions(
        Colorimetry {
            primaries: Some(ColorPrimaries::Bt709),
            ..Colorimetry::default()
        },
    ))
}

#[test]
fn prewarm_materializes_threshold_and_fourth_acquire_fails_fast() {
    let counting = Arc::new(CountingAllocator::default());
    let allocator = BufferPoolAllocator::new(counting.clone());

    let output = allocator
        .allocate(&descriptor(PixelFormat::Nv12, 1920, 1080), 3)
        .unwrap();

    assert_eq!(counting.pools.load(Ordering::SeqCst), 1);
    assert_eq!(counting.buffers.load(Ordering::SeqCst), 3);

    let held: Vec<_> = (0..3).map(|_| output.acquire().unwrap()).collect();
    let fourth = output.acquire();

    assert!(matches!(
        fourth,
        Err(VideoError::WouldExceedAllocationThreshold { threshold: 3 })
    ));
    // Reuse only: nothing new was allocated after pre-warming
    assert_eq!(counting.buffers.load(Ordering::SeqCst), 3);
    drop(held);
}

#[test]
fn refused_pool_reports_creation_failure() {
    let allocator = BufferPoolAllocator::new(Arc::new(RefusingAllocator));
    let result = allocator.allocate(&descriptor(PixelFormat::Bgra, 640, 480), 3);

    assert!(matches!(result, Err(VideoError::PoolCreation(_))));
}

#[test]
fn consumer_thread_release_returns_buffers() {
    let output = BufferPoolAllocator::default()
        .allocate(&descriptor(PixelFormat::Bgra, 320, 240), 3)
        .unwrap();
    let (tx, rx) = channel::bounded::<Frame>(3);

    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        for frame in rx {
            seen.push(frame.presentation_timestamp());
        }
        seen
    });

    for i in 0..12 {
        // The consumer drops each frame, so the pool keeps recycling
        let buffer = loop {
            match output.acquire() {
                Ok(buffer) => break buffer,
                Err(e) if e.is_exhaustion() => thread::yield_now(),
                Err(e) => panic!("unexpected pool error: {e}"),
            }
        };
        tx.send(Frame::new(buffer, MediaTime::new(i, 30))).unwrap();
    }
    drop(tx);

    let seen = consumer.join().unwrap();
    assert_eq!(seen.len(), 12);
    assert_eq!(output.stats().total_allocations, 3);
    assert_eq!(output.stats().in_use, 0);
}

#[test]
fn explicit_color_space_survives_into_pool() {
    let display_p3 = FrameDescriptor::extract(
        &FormatDescription::new(PixelFormat::Bgra, 64, 64)
            .with_extensions(Colorimetry::explicit(ColorSpace::DisplayP3)),
    );
    let output = BufferPoolAllocator::default().allocate(&display_p3, 2).unwrap();

    assert_eq!(output.color_space(), &ColorSpace::DisplayP3);
    assert_eq!(
        output.output_format().extensions.space,
        Some(ColorSpace::DisplayP3)
    );
}
