//! Error types for buffers, pools and frames

use crate::types::{MediaTime, PixelFormat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("frame carries no pixel buffer")]
    MissingBuffer,

    #[error("pixel buffer has no usable format description ({format} {width}x{height})")]
    MissingFormat {
        format: PixelFormat,
        width: u32,
        height: u32,
    },

    #[error("pool creation refused: {0}")]
    PoolCreation(String),

    #[error("allocation threshold of {threshold} buffers reached")]
    WouldExceedAllocationThreshold { threshold: usize },

    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("invalid presentation timestamp {0:?}")]
    InvalidTimestamp(MediaTime),

    #[error("buffer format {got} {got_width}x{got_height} does not match pool format {expected} {width}x{height}")]
    FormatMismatch {
        expected: PixelFormat,
        width: u32,
        height: u32,
        got: PixelFormat,
        got_width: u32,
        got_height: u32,
    },
}

impl VideoError {
    /// True for the non-blocking "pool is at its ceiling" signal
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, VideoError::WouldExceedAllocationThreshold { .. })
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;
