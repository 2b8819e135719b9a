//! Filter collaborator seam

use crate::image::Image;

/// Image in, image (or nothing) out
///
/// Returning `None` means the filter had no output for this frame; the
/// transformer then passes the input through unchanged.
pub trait ImageFilter: Send {
    fn apply(&mut self, image: &Image) -> Option<Image>;

    /// Name used in diagnostics
    fn name(&self) -> &str {
        "filter"
    }
}

impl<F> ImageFilter for F
where
    F: FnMut(&Image) -> Option<Image> + Send,
{
    fn apply(&mut self, image: &Image) -> Option<Image> {
        self(image)
    }
}

/// Returns its input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl ImageFilter for IdentityFilter {
    fn apply(&mut self, image: &Image) -> Option<Image> {
        Some(image.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}
