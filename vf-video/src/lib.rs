//! Video frames and output buffer pools
//!
//! Frame-side building blocks of the live filter pipeline:
//! - Pixel buffers with aligned, lockable plane storage
//! - Frame descriptors derived from input format metadata
//! - Bounded, lock-free buffer pools with an injectable allocator
//! - Pre-warming so the first frames never pay cold-allocation latency

pub mod buffer;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod frame_pool;
pub mod pool_allocator;
pub mod prewarm;
pub mod types;

pub use buffer::*;
pub use descriptor::*;
pub use error::VideoError;
pub use frame::*;
pub use frame_pool::*;
pub use pool_allocator::*;
pub use prewarm::*;
pub use types::*;
