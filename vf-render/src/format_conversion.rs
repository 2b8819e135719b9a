//! Pixel format conversion between working RGBA and buffer layouts
//!
//! Row-oriented so callers can split planes across threads. Y'CbCr formats
//! are video range; 4:2:0 chroma is the average of each 2x2 block.

use glam::Vec4;
use vf_video::YCbCrMatrix;

/// Luma weights for one Y'CbCr matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YuvCoefficients {
    kr: f32,
    kg: f32,
    kb: f32,
}

impl YuvCoefficients {
    pub fn new(matrix: YCbCrMatrix) -> Self {
        let (kr, kb) = matrix.coefficients();
        Self {
            kr,
            kg: 1.0 - kr - kb,
            kb,
        }
    }

    /// Returns (Y', Cb, Cr) with Y' in [0, 1] and chroma in [-0.5, 0.5]
    #[inline]
    pub fn rgb_to_ycbcr(&self, rgb: Vec4) -> (f32, f32, f32) {
        let (r, g, b) = (saturate(rgb.x), saturate(rgb.y), saturate(rgb.z));
        let y = self.kr * r + self.kg * g + self.kb * b;
        let cb = (b - y) / (2.0 * (1.0 - self.kb));
        let cr = (r - y) / (2.0 * (1.0 - self.kr));
        (y, cb, cr)
    }

    #[inline]
    pub fn ycbcr_to_rgb(&self, y: f32, cb: f32, cr: f32) -> Vec4 {
        let r = y + 2.0 * (1.0 - self.kr) * cr;
        let b = y + 2.0 * (1.0 - self.kb) * cb;
        let g = (y - self.kr * r - self.kb * b) / self.kg;
        Vec4::new(saturate(r), saturate(g), saturate(b), 1.0)
    }
}

#[inline]
fn saturate(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

// 8-bit video range
#[inline]
fn quantize_luma8(y: f32) -> u8 {
    (16.0 + 219.0 * y).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn quantize_chroma8(c: f32) -> u8 {
    (128.0 + 224.0 * c).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn dequantize_luma8(v: u8) -> f32 {
    (v as f32 - 16.0) / 219.0
}

#[inline]
fn dequantize_chroma8(v: u8) -> f32 {
    (v as f32 - 128.0) / 224.0
}

// 10-bit video range, stored in the high bits of 16
#[inline]
fn quantize_luma10(y: f32) -> u16 {
    ((64.0 + 876.0 * y).round().clamp(0.0, 1023.0) as u16) << 6
}

#[inline]
fn quantize_chroma10(c: f32) -> u16 {
    ((512.0 + 896.0 * c).round().clamp(0.0, 1023.0) as u16) << 6
}

#[inline]
fn dequantize_luma10(v: u16) -> f32 {
    ((v >> 6) as f32 - 64.0) / 876.0
}

#[inline]
fn dequantize_chroma10(v: u16) -> f32 {
    ((v >> 6) as f32 - 512.0) / 896.0
}

#[inline]
fn unorm8(v: f32) -> u8 {
    (saturate(v) * 255.0).round() as u8
}

/// Byte order of packed 8-bit RGB formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Bgra,
    Rgba,
}

pub fn decode_packed_row(row: &[u8], order: ChannelOrder, out: &mut [Vec4]) {
    for (px, bytes) in out.iter_mut().zip(row.chunks_exact(4)) {
        let [c0, c1, c2, a] = [bytes[0], bytes[1], bytes[2], bytes[3]].map(|v| v as f32 / 255.0);
        *px = match order {
            ChannelOrder::Bgra => Vec4::new(c2, c1, c0, a),
            ChannelOrder::Rgba => Vec4::new(c0, c1, c2, a),
        };
    }
}

pub fn encode_packed_row(src: &[Vec4], order: ChannelOrder, row: &mut [u8]) {
    for (px, bytes) in src.iter().zip(row.chunks_exact_mut(4)) {
        let (r, g, b, a) = (unorm8(px.x), unorm8(px.y), unorm8(px.z), unorm8(px.w));
        let packed = match order {
            ChannelOrder::Bgra => [b, g, r, a],
            ChannelOrder::Rgba => [r, g, b, a],
        };
        bytes.copy_from_slice(&packed);
    }
}

/// Decode one row of 4:2:0 content given per-sample accessors
///
/// `luma(x)` returns Y' in [0, 1], `chroma(i)` the (Cb, Cr) pair of chroma column `i`.
pub fn decode_420_row(
    coeffs: &YuvCoefficients,
    luma: impl Fn(usize) -> f32,
    chroma: impl Fn(usize) -> (f32, f32),
    out: &mut [Vec4],
) {
    for (x, px) in out.iter_mut().enumerate() {
        let (cb, cr) = chroma(x / 2);
        *px = coeffs.ycbcr_to_rgb(luma(x), cb, cr);
    }
}

pub fn decode_nv12_row(coeffs: &YuvCoefficients, y_row: &[u8], uv_row: &[u8], out: &mut [Vec4]) {
    decode_420_row(
        coeffs,
        |x| dequantize_luma8(y_row[x]),
        |i| {
            (
                dequantize_chroma8(uv_row[2 * i]),
                dequantize_chroma8(uv_row[2 * i + 1]),
            )
        },
        out,
    );
}

pub fn decode_i420_row(
    coeffs: &YuvCoefficients,
    y_row: &[u8],
    u_row: &[u8],
    v_row: &[u8],
    out: &mut [Vec4],
) {
    decode_420_row(
        coeffs,
        |x| dequantize_luma8(y_row[x]),
        |i| (dequantize_chroma8(u_row[i]), dequantize_chroma8(v_row[i])),
        out,
    );
}

pub fn decode_p010_row(coeffs: &YuvCoefficients, y_row: &[u16], uv_row: &[u16], out: &mut [Vec4]) {
    decode_420_row(
        coeffs,
        |x| dequantize_luma10(y_row[x]),
        |i| {
            (
                dequantize_chroma10(uv_row[2 * i]),
                dequantize_chroma10(uv_row[2 * i + 1]),
            )
        },
        out,
    );
}

/// Y' of every source pixel in a row
pub fn for_each_luma(coeffs: &YuvCoefficients, src: &[Vec4], mut f: impl FnMut(usize, f32)) {
    for (x, px) in src.iter().enumerate() {
        f(x, coeffs.rgb_to_ycbcr(*px).0);
    }
}

/// Averaged (Cb, Cr) for every 2x2 block of a row pair
///
/// `bottom` may equal `top` for the last row of odd-height content.
pub fn for_each_chroma(
    coeffs: &YuvCoefficients,
    top: &[Vec4],
    bottom: &[Vec4],
    mut f: impl FnMut(usize, f32, f32),
) {
    let columns = (top.len() + 1) / 2;
    for i in 0..columns {
        let x0 = 2 * i;
        let x1 = (x0 + 1).min(top.len() - 1);
        let avg = (top[x0] + top[x1] + bottom[x0] + bottom[x1]) * 0.25;
        let (_, cb, cr) = coeffs.rgb_to_ycbcr(avg);
        f(i, cb, cr);
    }
}

pub fn encode_luma8_row(coeffs: &YuvCoefficients, src: &[Vec4], row: &mut [u8]) {
    for_each_luma(coeffs, src, |x, y| row[x] = quantize_luma8(y));
}

pub fn encode_luma10_row(coeffs: &YuvCoefficients, src: &[Vec4], row: &mut [u16]) {
    for_each_luma(coeffs, src, |x, y| row[x] = quantize_luma10(y));
}

pub fn encode_nv12_chroma(coeffs: &YuvCoefficients, top: &[Vec4], bottom: &[Vec4], uv: &mut [u8]) {
    for_each_chroma(coeffs, top, bottom, |i, cb, cr| {
        uv[2 * i] = quantize_chroma8(cb);
        uv[2 * i + 1] = quantize_chroma8(cr);
    });
}

pub fn encode_i420_chroma(
    coeffs: &YuvCoefficients,
    top: &[Vec4],
    bottom: &[Vec4],
    u: &mut [u8],
    v: &mut [u8],
) {
    for_each_chroma(coeffs, top, bottom, |i, cb, cr| {
        u[i] = quantize_chroma8(cb);
        v[i] = quantize_chroma8(cr);
    });
}

pub fn encode_p010_chroma(
    coeffs: &YuvCoefficients,
    top: &[Vec4],
    bottom: &[Vec4],
    uv: &mut [u16],
) {
    for_each_chroma(coeffs, top, bottom, |i, cb, cr| {
        uv[2 * i] = quantize_chroma10(cb);
        uv[2 * i + 1] = quantize_chroma10(cr);
    });
}
