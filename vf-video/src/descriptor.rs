//! Frame descriptors: what an output buffer must look like to match its input

use crate::buffer::BufferAttributes;
use crate::types::{
    ColorPrimaries, ColorSpace, Colorimetry, FormatDescription, PixelFormat, TransferFunction,
    YCbCrMatrix,
};

/// Pixel format, dimensions and color attributes of a stream
///
/// Two frames with equal descriptors can share one output pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameDescriptor {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub colorimetry: Colorimetry,
}

impl FrameDescriptor {
    /// Derive a descriptor from input format metadata
    ///
    /// Never fails. Missing color extensions resolve to device RGB later,
    /// an unusable format surfaces when a pool is built for it.
    pub fn extract(format: &FormatDescription) -> Self {
        Self {
            pixel_format: format.pixel_format,
            width: format.width,
            height: format.height,
            colorimetry: format.extensions.clone(),
        }
    }

    pub fn color_primaries(&self) -> Option<ColorPrimaries> {
        self.colorimetry.primaries
    }

    pub fn ycbcr_matrix(&self) -> Option<YCbCrMatrix> {
        self.colorimetry.matrix
    }

    pub fn transfer_function(&self) -> Option<TransferFunction> {
        self.colorimetry.transfer
    }

    pub fn explicit_color_space(&self) -> Option<&ColorSpace> {
        self.colorimetry.space.as_ref()
    }

    /// Color space output buffers are rendered in
    pub fn color_space(&self) -> ColorSpace {
        self.colorimetry.color_space()
    }

    /// Per-buffer attributes for a pool serving this descriptor
    pub fn buffer_attributes(&self) -> BufferAttributes {
        BufferAttributes {
            pixel_format: self.pixel_format,
            width: self.width,
            height: self.height,
            surface_backed: true,
            attachments: self.colorimetry.clone(),
        }
    }

    pub fn describes(&self, format: &FormatDescription) -> bool {
        *self == Self::extract(format)
    }
}

/// Free-function form of [`FrameDescriptor::extract`]
pub fn extract(format: &FormatDescription) -> FrameDescriptor {
    FrameDescriptor::extract(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IccProfile;

    fn hd_nv12() -> FormatDescription {
        FormatDescription::new(PixelFormat::Nv12, 1920, 1080)
    }

    #[test]
    fn test_extract_copies_layout() {
        let descriptor = extract(&hd_nv12());

        assert_eq!(descriptor.pixel_format, PixelFormat::Nv12);
        assert_eq!((descriptor.width, descriptor.height), (1920, 1080));
        assert!(descriptor.colorimetry.is_empty());
    }

    #[test]
    fn test_missing_color_falls_back_to_device_rgb() {
        assert_eq!(extract(&hd_nv12()).color_space(), ColorSpace::DeviceRgb);
    }

    #[test]
    fn test_p3_primaries_select_display_p3() {
        let format = hd_nv12().with_extensions(Colorimetry {
            primaries: Some(ColorPrimaries::P3D65),
            matrix: Some(YCbCrMatrix::Bt709),
            ..Colorimetry::default()
        });

        assert_eq!(extract(&format).color_space(), ColorSpace::DisplayP3);
    }

    #[test]
    fn test_explicit_space_used_verbatim() {
        let icc = ColorSpace::Icc(IccProfile::new(vec![0x61, 0x63, 0x73, 0x70]));
        let format = hd_nv12().with_extensions(Colorimetry {
            primaries: Some(ColorPrimaries::P3D65),
            space: Some(icc.clone()),
            ..Colorimetry::default()
        });
        let descriptor = extract(&format);

        assert_eq!(descriptor.explicit_color_space(), Some(&icc));
        assert_eq!(descriptor.color_space(), icc);
    }

    #[test]
    fn test_descriptor_change_detection() {
        let base = extract(&hd_nv12());

        assert!(base.describes(&hd_nv12()));
        assert!(!base.describes(&FormatDescription::new(PixelFormat::Nv12, 1280, 720)));
        assert!(!base.describes(&FormatDescription::new(PixelFormat::Bgra, 1920, 1080)));
        assert!(!base.describes(&hd_nv12().with_extensions(Colorimetry::tagged(
            ColorPrimaries::Bt2020,
            YCbCrMatrix::Bt2020,
            TransferFunction::Hlg,
        ))));
    }

    #[test]
    fn test_buffer_attributes_carry_color() {
        let format = hd_nv12().with_extensions(Colorimetry::tagged(
            ColorPrimaries::Bt709,
            YCbCrMatrix::Bt709,
            TransferFunction::Bt709,
        ));
        let attributes = extract(&format).buffer_attributes();

        assert!(attributes.surface_backed);
        assert_eq!(attributes.format_description(), format);
    }
}
