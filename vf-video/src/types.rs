//! Video data types: pixel formats, color tags and timing

use std::fmt;
use std::sync::Arc;

/// Pixel format enumeration
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Unknown = 0,
    Bgra = 1, // Packed BGRA 8-bit
    Rgba = 2, // Packed RGBA 8-bit
    Nv12 = 3, // Semi-planar YUV 4:2:0 (Y plane, interleaved CbCr), video range
    I420 = 4, // Planar YUV 4:2:0, video range
    P010 = 5, // Semi-planar YUV 4:2:0 10-bit in 16-bit MSBs, video range
}

/// Unpadded geometry of one plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneGeometry {
    /// Samples (or sample pairs for interleaved chroma) per row
    pub width: usize,
    pub height: usize,
    /// Bytes actually covered by pixels in one row
    pub row_bytes: usize,
}

impl PixelFormat {
    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::Bgra | PixelFormat::Rgba => 1,
            PixelFormat::Nv12 | PixelFormat::P010 => 2,
            PixelFormat::I420 => 3,
        }
    }

    /// Returns bytes per pixel for packed formats
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            _ => 0, // Planar formats
        }
    }

    pub fn is_yuv(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::I420 | PixelFormat::P010)
    }

    /// Geometry of `plane` for a `width`x`height` image
    pub fn plane_geometry(self, plane: usize, width: u32, height: u32) -> Option<PlaneGeometry> {
        let (w, h) = (width as usize, height as usize);
        // 4:2:0 chroma rounds up for odd dimensions
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);

        let geometry = match (self, plane) {
            (PixelFormat::Bgra | PixelFormat::Rgba, 0) => (w, h, w * 4),
            (PixelFormat::Nv12 | PixelFormat::I420, 0) => (w, h, w),
            (PixelFormat::Nv12, 1) => (cw, ch, cw * 2),
            (PixelFormat::I420, 1 | 2) => (cw, ch, cw),
            (PixelFormat::P010, 0) => (w, h, w * 2),
            (PixelFormat::P010, 1) => (cw, ch, cw * 4),
            _ => return None,
        };

        Some(PlaneGeometry {
            width: geometry.0,
            height: geometry.1,
            row_bytes: geometry.2,
        })
    }

    /// Calculate frame size in bytes (without row padding)
    pub fn calculate_size(self, width: u32, height: u32) -> usize {
        (0..self.plane_count())
            .filter_map(|plane| self.plane_geometry(plane, width, height))
            .map(|g| g.row_bytes * g.height)
            .sum()
    }

    pub fn fourcc(self) -> &'static str {
        match self {
            PixelFormat::Unknown => "????",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Nv12 => "420v",
            PixelFormat::I420 => "y420",
            PixelFormat::P010 => "x420",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Color primaries tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorPrimaries {
    Bt709,
    Bt601,   // SMPTE-C
    Ebu3213, // PAL
    Bt2020,
    DciP3, // DCI white point
    P3D65, // Display P3
}

/// Y'CbCr matrix tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YCbCrMatrix {
    Bt601,
    Bt709,
    Bt2020,
    Smpte240M,
}

impl YCbCrMatrix {
    /// Luma coefficients (Kr, Kb)
    pub fn coefficients(self) -> (f32, f32) {
        match self {
            YCbCrMatrix::Bt601 => (0.299, 0.114),
            YCbCrMatrix::Bt709 => (0.2126, 0.0722),
            YCbCrMatrix::Bt2020 => (0.2627, 0.0593),
            YCbCrMatrix::Smpte240M => (0.212, 0.087),
        }
    }

    /// Matrix assumed for untagged buffers: HD and up use BT.709
    pub fn default_for(width: u32) -> Self {
        if width >= 1280 {
            YCbCrMatrix::Bt709
        } else {
            YCbCrMatrix::Bt601
        }
    }
}

/// Transfer function tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFunction {
    Bt709,
    Srgb,
    Linear,
    Pq,  // SMPTE ST 2084
    Hlg, // ARIB STD-B67
    Smpte240M,
}

/// Opaque ICC profile handle, compared by content
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IccProfile(Arc<[u8]>);

impl IccProfile {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self(data.into())
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for IccProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IccProfile").field("len", &self.0.len()).finish()
    }
}

/// Color space a buffer's pixel values are expressed in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// Device RGB, treated as sRGB
    #[default]
    DeviceRgb,
    Srgb,
    DisplayP3,
    Bt709,
    Bt2020,
    Bt2100Pq,
    Bt2100Hlg,
    /// Explicit profile attached by the producer
    Icc(IccProfile),
}

impl ColorSpace {
    /// Named space inferred from primaries and transfer tags
    pub fn from_primaries(primaries: ColorPrimaries, transfer: Option<TransferFunction>) -> Self {
        match (primaries, transfer) {
            (ColorPrimaries::P3D65, _) => ColorSpace::DisplayP3,
            (ColorPrimaries::Bt2020, Some(TransferFunction::Pq)) => ColorSpace::Bt2100Pq,
            (ColorPrimaries::Bt2020, Some(TransferFunction::Hlg)) => ColorSpace::Bt2100Hlg,
            (ColorPrimaries::Bt2020, _) => ColorSpace::Bt2020,
            (ColorPrimaries::Bt709, Some(TransferFunction::Srgb)) => ColorSpace::Srgb,
            (ColorPrimaries::Bt709, _) => ColorSpace::Bt709,
            (ColorPrimaries::Bt601 | ColorPrimaries::Ebu3213 | ColorPrimaries::DciP3, _) => {
                ColorSpace::DeviceRgb
            }
        }
    }

    /// Primaries and transfer function, `None` for ICC profiles
    pub fn components(&self) -> Option<(ColorPrimaries, TransferFunction)> {
        match self {
            ColorSpace::DeviceRgb | ColorSpace::Srgb => {
                Some((ColorPrimaries::Bt709, TransferFunction::Srgb))
            }
            ColorSpace::DisplayP3 => Some((ColorPrimaries::P3D65, TransferFunction::Srgb)),
            ColorSpace::Bt709 => Some((ColorPrimaries::Bt709, TransferFunction::Bt709)),
            ColorSpace::Bt2020 => Some((ColorPrimaries::Bt2020, TransferFunction::Bt709)),
            ColorSpace::Bt2100Pq => Some((ColorPrimaries::Bt2020, TransferFunction::Pq)),
            ColorSpace::Bt2100Hlg => Some((ColorPrimaries::Bt2020, TransferFunction::Hlg)),
            ColorSpace::Icc(_) => None,
        }
    }

    pub fn is_wide_gamut(&self) -> bool {
        matches!(
            self.components(),
            Some((ColorPrimaries::P3D65 | ColorPrimaries::Bt2020, _))
        )
    }
}

/// Optional color attributes of a format or buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Colorimetry {
    pub primaries: Option<ColorPrimaries>,
    pub matrix: Option<YCbCrMatrix>,
    pub transfer: Option<TransferFunction>,
    /// Explicit color space handle, takes precedence over the tags
    pub space: Option<ColorSpace>,
}

impl Colorimetry {
    pub fn tagged(
        primaries: ColorPrimaries,
        matrix: YCbCrMatrix,
        transfer: TransferFunction,
    ) -> Self {
        Self {
            primaries: Some(primaries),
            matrix: Some(matrix),
            transfer: Some(transfer),
            space: None,
        }
    }

    pub fn explicit(space: ColorSpace) -> Self {
        Self {
            space: Some(space),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Resolve the color space these attributes describe
    pub fn color_space(&self) -> ColorSpace {
        match (&self.space, self.primaries) {
            (Some(space), _) => space.clone(),
            (None, Some(ColorPrimaries::P3D65)) => ColorSpace::DisplayP3,
            (None, Some(primaries)) => ColorSpace::from_primaries(primaries, self.transfer),
            (None, None) => ColorSpace::DeviceRgb,
        }
    }
}

/// Presentation timestamp as a rational `value / timescale` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const INVALID: MediaTime = MediaTime {
        value: 0,
        timescale: 0,
    };

    pub fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self::new(nanos, 1_000_000_000)
    }

    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    pub fn seconds(&self) -> Option<f64> {
        self.is_valid()
            .then(|| self.value as f64 / self.timescale as f64)
    }
}

/// Format metadata of a frame: layout plus color extensions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatDescription {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub extensions: Colorimetry,
}

impl FormatDescription {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            extensions: Colorimetry::default(),
        }
    }

    pub fn with_extensions(mut self, extensions: Colorimetry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Same pixel layout (format and dimensions), color ignored
    pub fn same_layout(&self, other: &FormatDescription) -> bool {
        self.pixel_format == other.pixel_format
            && self.width == other.width
            && self.height == other.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_geometry_nv12_odd_dimensions() {
        let luma = PixelFormat::Nv12.plane_geometry(0, 641, 481).unwrap();
        let chroma = PixelFormat::Nv12.plane_geometry(1, 641, 481).unwrap();

        assert_eq!(luma.row_bytes, 641);
        assert_eq!(chroma.width, 321);
        assert_eq!(chroma.height, 241);
        assert_eq!(chroma.row_bytes, 642);
        assert!(PixelFormat::Nv12.plane_geometry(2, 641, 481).is_none());
    }

    #[test]
    fn test_calculate_size() {
        assert_eq!(PixelFormat::I420.calculate_size(1920, 1080), 1920 * 1080 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.calculate_size(1920, 1080), 1920 * 1080 * 3 / 2);
        assert_eq!(PixelFormat::P010.calculate_size(1920, 1080), 1920 * 1080 * 3);
        assert_eq!(PixelFormat::Bgra.calculate_size(640, 480), 640 * 480 * 4);
        assert_eq!(PixelFormat::Unknown.calculate_size(640, 480), 0);
    }

    #[test]
    fn test_color_space_resolution_order() {
        let p3 = Colorimetry {
            primaries: Some(ColorPrimaries::P3D65),
            ..Colorimetry::default()
        };
        assert_eq!(p3.color_space(), ColorSpace::DisplayP3);

        let icc = ColorSpace::Icc(IccProfile::new(vec![1u8, 2, 3]));
        let explicit = Colorimetry {
            space: Some(icc.clone()),
            ..p3
        };
        assert_eq!(explicit.color_space(), icc);

        assert_eq!(Colorimetry::default().color_space(), ColorSpace::DeviceRgb);
    }

    #[test]
    fn test_bt2020_transfer_selects_hdr_space() {
        let pq = Colorimetry::tagged(
            ColorPrimaries::Bt2020,
            YCbCrMatrix::Bt2020,
            TransferFunction::Pq,
        );
        assert_eq!(pq.color_space(), ColorSpace::Bt2100Pq);
        assert!(pq.color_space().is_wide_gamut());

        let sdr = Colorimetry::tagged(
            ColorPrimaries::Bt709,
            YCbCrMatrix::Bt709,
            TransferFunction::Bt709,
        );
        assert_eq!(sdr.color_space(), ColorSpace::Bt709);
        assert!(!sdr.color_space().is_wide_gamut());
    }

    #[test]
    fn test_media_time_validity() {
        assert!(!MediaTime::INVALID.is_valid());
        assert_eq!(MediaTime::new(3003, 90_000).seconds(), Some(3003.0 / 90_000.0));
        assert_eq!(MediaTime::INVALID.seconds(), None);
    }
}
