//! Color management: transfer curves and primaries conversion
#![allow(clippy::excessive_precision)]

use glam::{Mat3, Vec3, Vec4};
use vf_video::{ColorPrimaries, ColorSpace, TransferFunction};

/// SDR reference white inside PQ (BT.2408: 203 cd/m² of 10000)
const PQ_REFERENCE_WHITE: f32 = 203.0 / 10_000.0;

/// Convert from non-linear (encoded) to linear light, 1.0 = SDR white
pub fn to_linear(tf: TransferFunction, v: f32) -> f32 {
    match tf {
        TransferFunction::Linear => v,
        TransferFunction::Srgb => {
            if v <= 0.04045 {
                v / 12.92
            } else {
                ((v + 0.055) / 1.055).powf(2.4)
            }
        }
        TransferFunction::Bt709 => {
            if v < 0.081 {
                v / 4.5
            } else {
                ((v + 0.099) / 1.099).powf(1.0 / 0.45)
            }
        }
        TransferFunction::Smpte240M => {
            if v < 0.0913 {
                v / 4.0
            } else {
                ((v + 0.1115) / 1.1115).powf(1.0 / 0.45)
            }
        }
        TransferFunction::Pq => decode_pq(v) / PQ_REFERENCE_WHITE,
        TransferFunction::Hlg => decode_hlg(v),
    }
}

/// Convert from linear light to non-linear (encoded)
pub fn from_linear(tf: TransferFunction, v: f32) -> f32 {
    match tf {
        TransferFunction::Linear => v,
        TransferFunction::Srgb => {
            if v <= 0.0031308 {
                v * 12.92
            } else {
                1.055 * v.powf(1.0 / 2.4) - 0.055
            }
        }
        TransferFunction::Bt709 => {
            if v < 0.018 {
                v * 4.5
            } else {
                1.099 * v.powf(0.45) - 0.099
            }
        }
        TransferFunction::Smpte240M => {
            if v < 0.0228 {
                v * 4.0
            } else {
                1.1115 * v.powf(0.45) - 0.1115
            }
        }
        TransferFunction::Pq => encode_pq(v * PQ_REFERENCE_WHITE),
        TransferFunction::Hlg => encode_hlg(v),
    }
}

// PQ (ST.2084) constants
const PQ_M1: f32 = 0.1593017578125;
const PQ_M2: f32 = 78.84375;
const PQ_C1: f32 = 0.8359375;
const PQ_C2: f32 = 18.8515625;
const PQ_C3: f32 = 18.6875;

fn encode_pq(linear: f32) -> f32 {
    let ym1 = linear.max(0.0).powf(PQ_M1);
    ((PQ_C1 + PQ_C2 * ym1) / (1.0 + PQ_C3 * ym1)).powf(PQ_M2)
}

fn decode_pq(pq: f32) -> f32 {
    let p = pq.max(0.0).powf(1.0 / PQ_M2);
    let den = PQ_C2 - PQ_C3 * p;
    if den.abs() < 1e-10 {
        return 0.0;
    }
    ((p - PQ_C1).max(0.0) / den).powf(1.0 / PQ_M1)
}

// HLG constants
const HLG_A: f32 = 0.17883277;
const HLG_B: f32 = 0.28466892;
const HLG_C: f32 = 0.55991073;

fn encode_hlg(linear: f32) -> f32 {
    let e = linear.max(0.0);
    if e <= 1.0 / 12.0 {
        (3.0 * e).sqrt()
    } else {
        HLG_A * (12.0 * e - HLG_B).ln() + HLG_C
    }
}

fn decode_hlg(hlg: f32) -> f32 {
    let e = hlg.max(0.0);
    if e <= 0.5 {
        e * e / 3.0
    } else {
        ((e - HLG_C) / HLG_A).exp() / 12.0 + HLG_B / 12.0
    }
}

/// CIE xy chromaticities of red, green, blue and white
fn chromaticities(primaries: ColorPrimaries) -> [(f32, f32); 4] {
    const D65: (f32, f32) = (0.3127, 0.3290);
    match primaries {
        ColorPrimaries::Bt709 => [(0.640, 0.330), (0.300, 0.600), (0.150, 0.060), D65],
        ColorPrimaries::Bt601 => [(0.630, 0.340), (0.310, 0.595), (0.155, 0.070), D65],
        ColorPrimaries::Ebu3213 => [(0.640, 0.330), (0.290, 0.600), (0.150, 0.060), D65],
        ColorPrimaries::Bt2020 => [(0.708, 0.292), (0.170, 0.797), (0.131, 0.046), D65],
        ColorPrimaries::DciP3 => [
            (0.680, 0.320),
            (0.265, 0.690),
            (0.150, 0.060),
            (0.314, 0.351),
        ],
        ColorPrimaries::P3D65 => [(0.680, 0.320), (0.265, 0.690), (0.150, 0.060), D65],
    }
}

fn xy_to_xyz((x, y): (f32, f32)) -> Vec3 {
    Vec3::new(x / y, 1.0, (1.0 - x - y) / y)
}

/// RGB-to-XYZ matrix for a set of primaries (white maps to Y = 1)
pub fn rgb_to_xyz(primaries: ColorPrimaries) -> Mat3 {
    let [r, g, b, w] = chromaticities(primaries);
    let (r, g, b) = (xy_to_xyz(r), xy_to_xyz(g), xy_to_xyz(b));
    let scale = Mat3::from_cols(r, g, b).inverse() * xy_to_xyz(w);
    Mat3::from_cols(r * scale.x, g * scale.y, b * scale.z)
}

/// Per-pixel conversion between two color spaces
///
/// ICC profiles are opaque here, any conversion involving one is the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTransform {
    source: TransferFunction,
    target: TransferFunction,
    matrix: Mat3,
    identity: bool,
}

impl ColorTransform {
    pub fn identity() -> Self {
        Self {
            source: TransferFunction::Linear,
            target: TransferFunction::Linear,
            matrix: Mat3::IDENTITY,
            identity: true,
        }
    }

    pub fn new(from: &ColorSpace, to: &ColorSpace) -> Self {
        let (Some((src_primaries, source)), Some((dst_primaries, target))) =
            (from.components(), to.components())
        else {
            return Self::identity();
        };

        if src_primaries == dst_primaries && source == target {
            return Self::identity();
        }

        let matrix = if src_primaries == dst_primaries {
            Mat3::IDENTITY
        } else {
            rgb_to_xyz(dst_primaries).inverse() * rgb_to_xyz(src_primaries)
        };

        Self {
            source,
            target,
            matrix,
            identity: false,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Convert one RGBA pixel; alpha is untouched
    #[inline]
    pub fn apply(&self, pixel: Vec4) -> Vec4 {
        if self.identity {
            return pixel;
        }
        let linear = Vec3::new(
            to_linear(self.source, pixel.x),
            to_linear(self.source, pixel.y),
            to_linear(self.source, pixel.z),
        );
        let converted = self.matrix * linear;
        Vec4::new(
            from_linear(self.target, converted.x),
            from_linear(self.target, converted.y),
            from_linear(self.target, converted.z),
            pixel.w,
        )
    }
}
