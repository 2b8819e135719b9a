//! Filterable images in working RGBA

use crate::error::RenderError;
use crate::format_conversion::{
    decode_i420_row, decode_nv12_row, decode_p010_row, decode_packed_row, ChannelOrder,
    YuvCoefficients,
};
use glam::Vec4;
use rayon::prelude::*;
use std::fmt;
use vf_video::{BufferGuard, ColorSpace, PixelBuffer, PixelFormat, YCbCrMatrix};

/// Integer rectangle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && ((x - self.x) as u32) < self.width
            && ((y - self.y) as u32) < self.height
    }
}

/// RGBA image with values encoded in its color space
///
/// Pixels are stored row-major over `extent`; the extent origin may be
/// anywhere, so filters can grow, shrink or shift their output.
#[derive(Clone)]
pub struct Image {
    extent: Rect,
    pixels: Vec<Vec4>,
    color_space: ColorSpace,
}

impl Image {
    /// Transparent black image
    pub fn new(extent: Rect, color_space: ColorSpace) -> Self {
        let len = extent.width as usize * extent.height as usize;
        Self {
            extent,
            pixels: vec![Vec4::ZERO; len],
            color_space,
        }
    }

    /// Image whose pixel at absolute `(x, y)` is `f(x, y)`
    pub fn from_fn<F>(extent: Rect, color_space: ColorSpace, f: F) -> Self
    where
        F: Fn(i32, i32) -> Vec4 + Sync,
    {
        let mut image = Self::new(extent, color_space);
        let width = extent.width.max(1) as usize;
        image
            .pixels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, pixels)| {
                let y = extent.y + row as i32;
                for (col, px) in pixels.iter_mut().enumerate() {
                    *px = f(extent.x + col as i32, y);
                }
            });
        image
    }

    /// Wrap a pixel buffer's content as an image
    pub fn from_pixel_buffer(buffer: &PixelBuffer) -> Result<Self, RenderError> {
        let mut image = Self::new(Rect::default(), ColorSpace::default());
        image.load_pixel_buffer(buffer)?;
        Ok(image)
    }

    /// Replace this image's content with a pixel buffer's, reusing storage
    pub fn load_pixel_buffer(&mut self, buffer: &PixelBuffer) -> Result<(), RenderError> {
        let format = buffer.pixel_format();
        let (width, height) = (buffer.width() as usize, buffer.height() as usize);
        if width == 0 || height == 0 {
            return Err(RenderError::UnsupportedFormat(format));
        }

        let attachments = buffer.attachments();
        let coeffs = YuvCoefficients::new(
            attachments
                .matrix
                .unwrap_or_else(|| YCbCrMatrix::default_for(buffer.width())),
        );

        self.extent = Rect::from_size(buffer.width(), buffer.height());
        self.color_space = attachments.color_space();
        self.pixels.clear();
        self.pixels.resize(width * height, Vec4::ZERO);

        let guard = buffer.lock();
        let rows = self.pixels.par_chunks_mut(width).enumerate();

        match format {
            PixelFormat::Bgra | PixelFormat::Rgba => {
                let order = if format == PixelFormat::Bgra {
                    ChannelOrder::Bgra
                } else {
                    ChannelOrder::Rgba
                };
                let (plane, stride) = plane(&guard, 0, format)?;
                rows.for_each(|(y, out)| decode_packed_row(&plane[y * stride..], order, out));
            }
            PixelFormat::Nv12 => {
                let (luma, luma_stride) = plane(&guard, 0, format)?;
                let (uv, uv_stride) = plane(&guard, 1, format)?;
                rows.for_each(|(y, out)| {
                    decode_nv12_row(
                        &coeffs,
                        &luma[y * luma_stride..],
                        &uv[(y / 2) * uv_stride..],
                        out,
                    )
                });
            }
            PixelFormat::I420 => {
                let (luma, luma_stride) = plane(&guard, 0, format)?;
                let (u, u_stride) = plane(&guard, 1, format)?;
                let (v, v_stride) = plane(&guard, 2, format)?;
                rows.for_each(|(y, out)| {
                    decode_i420_row(
                        &coeffs,
                        &luma[y * luma_stride..],
                        &u[(y / 2) * u_stride..],
                        &v[(y / 2) * v_stride..],
                        out,
                    )
                });
            }
            PixelFormat::P010 => {
                let (luma, luma_stride) = plane16(&guard, 0, format)?;
                let (uv, uv_stride) = plane16(&guard, 1, format)?;
                rows.for_each(|(y, out)| {
                    decode_p010_row(
                        &coeffs,
                        &luma[y * luma_stride..],
                        &uv[(y / 2) * uv_stride..],
                        out,
                    )
                });
            }
            PixelFormat::Unknown => return Err(RenderError::UnsupportedFormat(format)),
        }

        Ok(())
    }

    pub fn extent(&self) -> Rect {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn color_space(&self) -> &ColorSpace {
        &self.color_space
    }

    /// Retag the pixels without converting them
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Move the extent origin, pixels unchanged
    pub fn translated(mut self, dx: i32, dy: i32) -> Self {
        self.extent.x += dx;
        self.extent.y += dy;
        self
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Vec4] {
        &mut self.pixels
    }

    /// Pixel at absolute coordinates, transparent black outside the extent
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Vec4 {
        if !self.extent.contains(x, y) {
            return Vec4::ZERO;
        }
        let col = (x - self.extent.x) as usize;
        let row = (y - self.extent.y) as usize;
        self.pixels[row * self.extent.width as usize + col]
    }

    /// Apply `f` to every pixel
    pub fn map<F>(&self, f: F) -> Image
    where
        F: Fn(Vec4) -> Vec4 + Sync + Send,
    {
        Image {
            extent: self.extent,
            pixels: self.pixels.par_iter().map(|px| f(*px)).collect(),
            color_space: self.color_space.clone(),
        }
    }

    /// Copy of the region `rect`; areas outside this image stay transparent
    pub fn cropped(&self, rect: Rect) -> Image {
        Image::from_fn(rect, self.color_space.clone(), |x, y| self.pixel(x, y))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("extent", &self.extent)
            .field("color_space", &self.color_space)
            .finish()
    }
}

fn plane<'a>(
    guard: &'a BufferGuard<'_>,
    index: usize,
    format: PixelFormat,
) -> Result<(&'a [u8], usize), RenderError> {
    match (guard.plane(index), guard.stride(index)) {
        (Some(plane), Some(stride)) => Ok((plane, stride)),
        _ => Err(RenderError::UnsupportedFormat(format)),
    }
}

/// Plane as 16-bit samples, stride in samples
fn plane16<'a>(
    guard: &'a BufferGuard<'_>,
    index: usize,
    format: PixelFormat,
) -> Result<(&'a [u16], usize), RenderError> {
    let (bytes, stride) = plane(guard, index, format)?;
    let samples = bytemuck::try_cast_slice::<u8, u16>(bytes)
        .map_err(|_| RenderError::Misaligned { plane: index })?;
    Ok((samples, stride / 2))
}
