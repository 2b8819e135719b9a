//! Frames: a pixel buffer paired with its presentation timestamp

use crate::buffer::PixelBuffer;
use crate::error::{Result, VideoError};
use crate::types::{FormatDescription, MediaTime};

/// One unit of video data
///
/// Cloning is cheap and shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    buffer: Option<PixelBuffer>,
    pts: MediaTime,
}

impl Frame {
    pub fn new(buffer: PixelBuffer, pts: MediaTime) -> Self {
        Self {
            buffer: Some(buffer),
            pts,
        }
    }

    /// A sample with timing only (e.g. a dropped-frame marker)
    pub fn without_buffer(pts: MediaTime) -> Self {
        Self { buffer: None, pts }
    }

    /// Package a rendered buffer, rejecting undescribable buffers and invalid timing
    pub fn wrap(buffer: PixelBuffer, pts: MediaTime) -> Result<Self> {
        if !pts.is_valid() {
            return Err(VideoError::InvalidTimestamp(pts));
        }
        buffer.format_description()?;
        Ok(Self::new(buffer, pts))
    }

    pub fn pixel_buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn into_pixel_buffer(self) -> Option<PixelBuffer> {
        self.buffer
    }

    pub fn presentation_timestamp(&self) -> MediaTime {
        self.pts
    }

    /// Format description of the carried buffer
    pub fn format_description(&self) -> Result<FormatDescription> {
        self.buffer
            .as_ref()
            .ok_or(VideoError::MissingBuffer)?
            .format_description()
    }

    /// Same timestamp and the very same pixel buffer
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        let same_buffer = match (&self.buffer, &other.buffer) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        same_buffer && self.pts == other.pts
    }
}
