//! Render and transform errors

use crate::image::Rect;
use thiserror::Error;
use vf_video::{PixelFormat, VideoError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("render bounds {0:?} are empty")]
    EmptyBounds(Rect),

    #[error("plane {plane} is not aligned for 16-bit samples")]
    Misaligned { plane: usize },

    #[error(transparent)]
    Video(#[from] VideoError),
}

#[derive(Debug, Error)]
pub enum FilterFailure {
    #[error("no filter installed")]
    Missing,

    #[error("filter produced no output")]
    NoOutput,

    #[error("cannot read input as an image: {0}")]
    Input(#[source] RenderError),
}

/// Which pipeline step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MissingBuffer,
    MissingFormat,
    PoolCreation,
    Filter,
    BufferAcquisition,
    Render,
    Wrap,
}

impl FailureKind {
    pub const ALL: [FailureKind; 7] = [
        FailureKind::MissingBuffer,
        FailureKind::MissingFormat,
        FailureKind::PoolCreation,
        FailureKind::Filter,
        FailureKind::BufferAcquisition,
        FailureKind::Render,
        FailureKind::Wrap,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("input frame has no pixel buffer")]
    MissingBuffer,

    #[error("input frame has no usable format: {0}")]
    MissingFormat(#[source] VideoError),

    #[error("output pool unavailable: {0}")]
    PoolCreation(#[source] VideoError),

    #[error("output pool creation backing off for {remaining} more frames")]
    PoolBackoff { remaining: u32 },

    #[error("filter failed: {0}")]
    Filter(#[from] FilterFailure),

    #[error("no output buffer: {0}")]
    BufferAcquisition(#[source] VideoError),

    #[error("render failed: {0}")]
    Render(#[source] RenderError),

    #[error("cannot wrap rendered buffer: {0}")]
    Wrap(#[source] VideoError),
}

impl TransformError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransformError::MissingBuffer => FailureKind::MissingBuffer,
            TransformError::MissingFormat(_) => FailureKind::MissingFormat,
            TransformError::PoolCreation(_) | TransformError::PoolBackoff { .. } => {
                FailureKind::PoolCreation
            }
            TransformError::Filter(_) => FailureKind::Filter,
            TransformError::BufferAcquisition(_) => FailureKind::BufferAcquisition,
            TransformError::Render(_) => FailureKind::Render,
            TransformError::Wrap(_) => FailureKind::Wrap,
        }
    }
}
