//! Render context: pixel transfer from a filtered image into a buffer
//!
//! Converts color from the image's space into the target's, then encodes
//! rows into the target's pixel format. Rows (or row pairs for 4:2:0
//! formats) are spread over the rayon pool.

use crate::color::ColorTransform;
use crate::error::RenderError;
use crate::format_conversion::{
    encode_i420_chroma, encode_luma10_row, encode_luma8_row, encode_nv12_chroma,
    encode_p010_chroma, encode_packed_row, ChannelOrder, YuvCoefficients,
};
use crate::image::{Image, Rect};
use glam::Vec4;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use vf_video::{ColorSpace, PixelBuffer, PixelFormat, YCbCrMatrix};

#[derive(Debug, Clone)]
struct CachedTransform {
    from: ColorSpace,
    to: ColorSpace,
    transform: ColorTransform,
}

/// Reusable render context
///
/// Holds no per-target state; the last color transform is cached since
/// consecutive frames almost always share source and target spaces.
#[derive(Debug, Default)]
pub struct RenderContext {
    transform_cache: Mutex<Option<CachedTransform>>,
    frames_rendered: AtomicU64,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `image` into `target`, tagged as `color_space`
    ///
    /// Only `bounds ∩ target` is written (widened to whole 2x2 blocks for
    /// 4:2:0 targets); the rest of the target is left as it was. Pixels
    /// outside the image extent are transparent black. Locks the target
    /// for the duration of the call.
    pub fn render(
        &self,
        image: &Image,
        target: &PixelBuffer,
        bounds: Rect,
        color_space: &ColorSpace,
    ) -> Result<(), RenderError> {
        let format = target.pixel_format();
        if format == PixelFormat::Unknown {
            return Err(RenderError::UnsupportedFormat(format));
        }

        let (width, height) = (target.width(), target.height());
        let mut region =
            Region::clip(bounds, width, height).ok_or(RenderError::EmptyBounds(bounds))?;
        if format.is_yuv() {
            region = region.widen_to_chroma(width as usize, height as usize);
        }

        let transform = self.color_transform(image.color_space(), color_space);
        let shade = |x: usize, y: usize| transform.apply(image.pixel(x as i32, y as i32));

        let coeffs = YuvCoefficients::new(
            target
                .attachments()
                .matrix
                .unwrap_or_else(|| YCbCrMatrix::default_for(width)),
        );
        let layout = target.layout();
        let stride = |plane: usize| {
            layout
                .plane(plane)
                .map(|p| p.stride)
                .ok_or(RenderError::UnsupportedFormat(format))
        };

        let mut guard = target.lock();
        let mut planes = guard.planes_mut().into_iter();
        let mut next_plane = || planes.next().ok_or(RenderError::UnsupportedFormat(format));

        match format {
            PixelFormat::Bgra | PixelFormat::Rgba => {
                let order = if format == PixelFormat::Bgra {
                    ChannelOrder::Bgra
                } else {
                    ChannelOrder::Rgba
                };
                let stride = stride(0)?;
                next_plane()?
                    .par_chunks_mut(stride)
                    .skip(region.y0)
                    .take(region.height())
                    .enumerate()
                    .for_each_init(Vec::new, |scratch, (j, row)| {
                        region.shade_row(region.y0 + j, &shade, scratch);
                        encode_packed_row(scratch, order, &mut row[region.x0 * 4..]);
                    });
            }
            PixelFormat::Nv12 => {
                let (luma_stride, uv_stride) = (stride(0)?, stride(1)?);
                let (luma, uv) = (next_plane()?, next_plane()?);
                let first = region.y0 / 2;
                luma.par_chunks_mut(2 * luma_stride)
                    .zip(uv.par_chunks_mut(uv_stride))
                    .skip(first)
                    .take(region.pairs())
                    .enumerate()
                    .for_each_init(
                        || (Vec::new(), Vec::new()),
                        |(top, bottom), (j, (rows, uv_row))| {
                            let has_bottom = region.shade_pair(first + j, &shade, top, bottom);
                            let (top_row, bottom_row) =
                                rows.split_at_mut(luma_stride.min(rows.len()));
                            encode_luma8_row(&coeffs, top, &mut top_row[region.x0..]);
                            if has_bottom {
                                encode_luma8_row(&coeffs, bottom, &mut bottom_row[region.x0..]);
                            }
                            encode_nv12_chroma(&coeffs, top, bottom, &mut uv_row[region.x0..]);
                        },
                    );
            }
            PixelFormat::I420 => {
                let (luma_stride, u_stride, v_stride) = (stride(0)?, stride(1)?, stride(2)?);
                let (luma, u, v) = (next_plane()?, next_plane()?, next_plane()?);
                let first = region.y0 / 2;
                let chroma_x = region.x0 / 2;
                luma.par_chunks_mut(2 * luma_stride)
                    .zip(u.par_chunks_mut(u_stride))
                    .zip(v.par_chunks_mut(v_stride))
                    .skip(first)
                    .take(region.pairs())
                    .enumerate()
                    .for_each_init(
                        || (Vec::new(), Vec::new()),
                        |(top, bottom), (j, ((rows, u_row), v_row))| {
                            let has_bottom = region.shade_pair(first + j, &shade, top, bottom);
                            let (top_row, bottom_row) =
                                rows.split_at_mut(luma_stride.min(rows.len()));
                            encode_luma8_row(&coeffs, top, &mut top_row[region.x0..]);
                            if has_bottom {
                                encode_luma8_row(&coeffs, bottom, &mut bottom_row[region.x0..]);
                            }
                            encode_i420_chroma(
                                &coeffs,
                                top,
                                bottom,
                                &mut u_row[chroma_x..],
                                &mut v_row[chroma_x..],
                            );
                        },
                    );
            }
            PixelFormat::P010 => {
                // Strides in 16-bit samples
                let (luma_stride, uv_stride) = (stride(0)? / 2, stride(1)? / 2);
                let luma = bytemuck::try_cast_slice_mut::<u8, u16>(next_plane()?)
                    .map_err(|_| RenderError::Misaligned { plane: 0 })?;
                let uv = bytemuck::try_cast_slice_mut::<u8, u16>(next_plane()?)
                    .map_err(|_| RenderError::Misaligned { plane: 1 })?;
                let first = region.y0 / 2;
                luma.par_chunks_mut(2 * luma_stride)
                    .zip(uv.par_chunks_mut(uv_stride))
                    .skip(first)
                    .take(region.pairs())
                    .enumerate()
                    .for_each_init(
                        || (Vec::new(), Vec::new()),
                        |(top, bottom), (j, (rows, uv_row))| {
                            let has_bottom = region.shade_pair(first + j, &shade, top, bottom);
                            let (top_row, bottom_row) =
                                rows.split_at_mut(luma_stride.min(rows.len()));
                            encode_luma10_row(&coeffs, top, &mut top_row[region.x0..]);
                            if has_bottom {
                                encode_luma10_row(&coeffs, bottom, &mut bottom_row[region.x0..]);
                            }
                            encode_p010_chroma(&coeffs, top, bottom, &mut uv_row[region.x0..]);
                        },
                    );
            }
            PixelFormat::Unknown => return Err(RenderError::UnsupportedFormat(format)),
        }

        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    fn color_transform(&self, from: &ColorSpace, to: &ColorSpace) -> ColorTransform {
        let mut cache = self.transform_cache.lock();
        if let Some(cached) = cache.as_ref() {
            if &cached.from == from && &cached.to == to {
                return cached.transform;
            }
        }

        let transform = ColorTransform::new(from, to);
        *cache = Some(CachedTransform {
            from: from.clone(),
            to: to.clone(),
            transform,
        });
        transform
    }
}

/// Half-open pixel rectangle inside a target buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Region {
    fn clip(bounds: Rect, width: u32, height: u32) -> Option<Region> {
        let x0 = i64::from(bounds.x).max(0);
        let y0 = i64::from(bounds.y).max(0);
        let x1 = (i64::from(bounds.x) + i64::from(bounds.width)).min(i64::from(width));
        let y1 = (i64::from(bounds.y) + i64::from(bounds.height)).min(i64::from(height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Region {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: x1 as usize,
            y1: y1 as usize,
        })
    }

    fn widen_to_chroma(self, width: usize, height: usize) -> Region {
        Region {
            x0: self.x0 & !1,
            y0: self.y0 & !1,
            x1: ((self.x1 + 1) & !1).min(width),
            y1: ((self.y1 + 1) & !1).min(height),
        }
    }

    fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// Row pairs covered; `y0` is even
    fn pairs(&self) -> usize {
        (self.height() + 1) / 2
    }

    fn shade_row<F>(&self, y: usize, shade: &F, out: &mut Vec<Vec4>)
    where
        F: Fn(usize, usize) -> Vec4,
    {
        out.clear();
        out.extend((self.x0..self.x1).map(|x| shade(x, y)));
    }

    /// Shade both rows of chroma row `pair`; false when the bottom row is
    /// past the region, in which case `bottom` repeats `top`
    fn shade_pair<F>(&self, pair: usize, shade: &F, top: &mut Vec<Vec4>, bottom: &mut Vec<Vec4>) -> bool
    where
        F: Fn(usize, usize) -> Vec4,
    {
        let y = 2 * pair;
        self.shade_row(y, shade, top);
        if y + 1 < self.y1 {
            self.shade_row(y + 1, shade, bottom);
            true
        } else {
            bottom.clear();
            bottom.extend_from_slice(top);
            false
        }
    }
}
