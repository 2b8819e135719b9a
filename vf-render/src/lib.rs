//! Live video filter pipeline
//!
//! Runs an image filter over each frame of a stream and renders the result
//! into buffers from a pre-warmed, reused output pool.
//!
//! Key properties:
//! - Output timestamps always equal input timestamps
//! - One output pool per stream format, replaced only on format change
//! - Any failing step passes the input frame through unchanged
//! - Color spaces carried from input to output (sRGB, Display P3, BT.709/2020/2100)
//! - Row-parallel decode and encode via rayon

pub mod color;
pub mod error;
pub mod filter;
pub mod format_conversion;
pub mod image;
pub mod render;
pub mod transformer;

pub use color::ColorTransform;
pub use error::{FailureKind, FilterFailure, RenderError, TransformError};
pub use filter::*;
pub use image::*;
pub use render::*;
pub use transformer::*;
