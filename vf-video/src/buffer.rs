//! Pixel buffers: aligned plane storage behind a shared, lockable handle

use crate::error::{Result, VideoError};
use crate::types::{Colorimetry, FormatDescription, PixelFormat, PlaneGeometry};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};

/// Row strides are padded to a cache line (also covers 32-byte AVX2 loads)
pub const ROW_ALIGNMENT: usize = 64;

const MAX_PLANES: usize = 3;

/// Attributes every buffer of a given shape is created with
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferAttributes {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Request storage that can back a platform surface
    pub surface_backed: bool,
    /// Color attachments propagated onto the buffer
    pub attachments: Colorimetry,
}

impl BufferAttributes {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            surface_backed: false,
            attachments: Colorimetry::default(),
        }
    }

    pub fn with_attachments(mut self, attachments: Colorimetry) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn format_description(&self) -> FormatDescription {
        FormatDescription::new(self.pixel_format, self.width, self.height)
            .with_extensions(self.attachments.clone())
    }
}

/// Placement of one plane inside a buffer's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: usize,
    pub stride: usize,
    pub geometry: PlaneGeometry,
}

impl PlaneLayout {
    /// Bytes spanned by the plane, padding included
    pub fn len(&self) -> usize {
        self.stride * self.geometry.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plane placement for a format and size, all planes in one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    planes: Vec<PlaneLayout>,
    size: usize,
}

impl BufferLayout {
    /// `None` for `Unknown` formats or empty dimensions
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Option<Self> {
        if format == PixelFormat::Unknown || width == 0 || height == 0 {
            return None;
        }

        let mut planes = Vec::with_capacity(format.plane_count());
        let mut offset = 0;

        for plane in 0..format.plane_count() {
            let geometry = format.plane_geometry(plane, width, height)?;
            let stride = align_up(geometry.row_bytes, ROW_ALIGNMENT);
            planes.push(PlaneLayout {
                offset,
                stride,
                geometry,
            });
            offset += stride * geometry.height;
        }

        Some(Self {
            planes,
            size: offset,
        })
    }

    /// Single raw plane for buffers without a known pixel format
    fn opaque(len: usize) -> Self {
        Self {
            planes: vec![PlaneLayout {
                offset: 0,
                stride: len,
                geometry: PlaneGeometry {
                    width: len,
                    height: 1,
                    row_bytes: len,
                },
            }],
            size: len,
        }
    }

    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&PlaneLayout> {
        self.planes.get(index)
    }

    /// Total bytes, row padding included
    pub fn size(&self) -> usize {
        self.size
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// Zero-initialised backing store, 8-byte aligned
#[derive(Default)]
pub struct PixelStorage {
    words: Vec<u64>,
    len: usize,
}

impl PixelStorage {
    /// Allocate `len` zeroed bytes, reporting exhaustion instead of aborting
    pub fn try_zeroed(len: usize) -> Result<Self> {
        let word_count = (len + 7) / 8;
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|e| VideoError::Allocation(format!("{len} bytes: {e}")))?;
        words.resize(word_count, 0);
        Ok(Self { words, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

impl fmt::Debug for PixelStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelStorage").field("len", &self.len).finish()
    }
}

/// Receives storage back when the last handle to a pooled buffer drops
pub(crate) trait StorageRecycler: Send + Sync {
    fn recycle(&self, storage: PixelStorage);
}

struct BufferInner {
    attributes: Arc<BufferAttributes>,
    layout: Arc<BufferLayout>,
    storage: Mutex<PixelStorage>,
    recycler: Option<Weak<dyn StorageRecycler>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        // A pool that is already gone lets the storage free normally
        if let Some(pool) = self.recycler.as_ref().and_then(Weak::upgrade) {
            pool.recycle(std::mem::take(self.storage.get_mut()));
        }
    }
}

/// Shared handle to a pixel buffer
///
/// Clones refer to the same pixels. Pixel access goes through [`PixelBuffer::lock`].
#[derive(Clone)]
pub struct PixelBuffer {
    inner: Arc<BufferInner>,
}

impl PixelBuffer {
    /// Allocate a standalone (non-pooled) buffer
    pub fn new(attributes: BufferAttributes) -> Result<Self> {
        let layout = BufferLayout::new(attributes.pixel_format, attributes.width, attributes.height)
            .ok_or(VideoError::MissingFormat {
                format: attributes.pixel_format,
                width: attributes.width,
                height: attributes.height,
            })?;
        let storage = PixelStorage::try_zeroed(layout.size())?;
        Ok(Self::from_parts(
            Arc::new(attributes),
            Arc::new(layout),
            storage,
            None,
        ))
    }

    /// Buffer holding `len` bytes of data with no describable pixel format
    pub fn opaque(len: usize) -> Result<Self> {
        let attributes = BufferAttributes::new(PixelFormat::Unknown, 0, 0);
        let storage = PixelStorage::try_zeroed(len)?;
        Ok(Self::from_parts(
            Arc::new(attributes),
            Arc::new(BufferLayout::opaque(len)),
            storage,
            None,
        ))
    }

    pub(crate) fn from_parts(
        attributes: Arc<BufferAttributes>,
        layout: Arc<BufferLayout>,
        storage: PixelStorage,
        recycler: Option<Weak<dyn StorageRecycler>>,
    ) -> Self {
        debug_assert!(storage.len() >= layout.size());
        Self {
            inner: Arc::new(BufferInner {
                attributes,
                layout,
                storage: Mutex::new(storage),
                recycler,
            }),
        }
    }

    pub fn attributes(&self) -> &BufferAttributes {
        &self.inner.attributes
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.inner.attributes.pixel_format
    }

    pub fn width(&self) -> u32 {
        self.inner.attributes.width
    }

    pub fn height(&self) -> u32 {
        self.inner.attributes.height
    }

    pub fn attachments(&self) -> &Colorimetry {
        &self.inner.attributes.attachments
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.inner.layout
    }

    /// True when this buffer's storage came from a pool
    pub fn is_pooled(&self) -> bool {
        self.inner.recycler.is_some()
    }

    /// Format description derived from the buffer's attributes
    pub fn format_description(&self) -> Result<FormatDescription> {
        let attrs = &self.inner.attributes;
        if BufferLayout::new(attrs.pixel_format, attrs.width, attrs.height).is_none() {
            return Err(VideoError::MissingFormat {
                format: attrs.pixel_format,
                width: attrs.width,
                height: attrs.height,
            });
        }
        Ok(attrs.format_description())
    }

    /// Lock the base address for CPU access
    pub fn lock(&self) -> BufferGuard<'_> {
        BufferGuard {
            layout: &self.inner.layout,
            storage: self.inner.storage.lock(),
        }
    }

    /// Same underlying buffer
    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("format", &self.pixel_format())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

/// Locked view of a buffer's planes; unlocks on drop
pub struct BufferGuard<'a> {
    layout: &'a BufferLayout,
    storage: MutexGuard<'a, PixelStorage>,
}

impl<'a> BufferGuard<'a> {
    pub fn layout(&self) -> &BufferLayout {
        self.layout
    }

    pub fn stride(&self, plane: usize) -> Option<usize> {
        self.layout.plane(plane).map(|p| p.stride)
    }

    pub fn plane(&self, plane: usize) -> Option<&[u8]> {
        let p = self.layout.plane(plane)?;
        Some(&self.storage.bytes()[p.offset..p.offset + p.len()])
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        let p = *self.layout.plane(plane)?;
        Some(&mut self.storage.bytes_mut()[p.offset..p.offset + p.len()])
    }

    /// All planes mutably at once, in plane order
    pub fn planes_mut(&mut self) -> Vec<&mut [u8]> {
        let mut planes = Vec::with_capacity(MAX_PLANES);
        let mut rest = self.storage.bytes_mut();
        let mut consumed = 0;

        for p in self.layout.planes() {
            let tail = std::mem::take(&mut rest);
            let (_, tail) = tail.split_at_mut(p.offset - consumed);
            let (plane, tail) = tail.split_at_mut(p.len());
            planes.push(plane);
            rest = tail;
            consumed = p.offset + p.len();
        }

        planes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_strides_are_aligned() {
        let layout = BufferLayout::new(PixelFormat::Nv12, 1918, 1080).unwrap();

        assert_eq!(layout.planes().len(), 2);
        for plane in layout.planes() {
            assert_eq!(plane.stride % ROW_ALIGNMENT, 0);
            assert_eq!(plane.offset % 32, 0, "plane not aligned for AVX2");
        }
        assert_eq!(layout.plane(1).unwrap().offset, 1920 * 1080);
    }

    #[test]
    fn test_layout_rejects_unknown_and_empty() {
        assert!(BufferLayout::new(PixelFormat::Unknown, 16, 16).is_none());
        assert!(BufferLayout::new(PixelFormat::Bgra, 0, 16).is_none());
    }

    #[test]
    fn test_planes_mut_splits_all_planes() {
        let buffer = PixelBuffer::new(BufferAttributes::new(PixelFormat::I420, 64, 32)).unwrap();
        let mut guard = buffer.lock();
        let planes = guard.planes_mut();

        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].len(), 64 * 32);
        assert_eq!(planes[1].len(), 64 * 16);
        assert_eq!(planes[2].len(), 64 * 16);
    }

    #[test]
    fn test_writes_visible_through_clones() {
        let buffer = PixelBuffer::new(BufferAttributes::new(PixelFormat::Bgra, 4, 4)).unwrap();
        let alias = buffer.clone();

        buffer.lock().plane_mut(0).unwrap()[0] = 0xAB;

        assert!(alias.ptr_eq(&buffer));
        assert_eq!(alias.lock().plane(0).unwrap()[0], 0xAB);
    }

    #[test]
    fn test_opaque_buffer_has_no_format_description() {
        let buffer = PixelBuffer::opaque(128).unwrap();
        assert!(matches!(
            buffer.format_description(),
            Err(VideoError::MissingFormat { .. })
        ));
    }
}
