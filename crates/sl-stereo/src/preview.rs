//! 8-bit visualizations of float fields.

use sl_stereo_core::{is_valid, ScalarField};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error("field has no pixels")]
    Empty,

    #[error(transparent)]
    Image(#[from] ::image::ImageError),
}

/// Map the valid range of `field` linearly onto `1..=255`; invalid pixels
/// are black. A constant field maps to mid-gray.
pub fn field_to_gray(field: &ScalarField) -> Result<::image::GrayImage, PreviewError> {
    if field.is_empty() {
        return Err(PreviewError::Empty);
    }
    let range = field.valid_range();
    let pixels: Vec<u8> = field
        .data
        .iter()
        .map(|&v| match range {
            Some((lo, hi)) if is_valid(v) => {
                if hi > lo {
                    1 + ((v - lo) / (hi - lo) * 254.0).round() as u8
                } else {
                    128
                }
            }
            _ => 0,
        })
        .collect();
    ::image::GrayImage::from_raw(field.width as u32, field.height as u32, pixels)
        .ok_or(PreviewError::Empty)
}

/// Write a PNG preview of `field` to `path`.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(field)))]
pub fn write_preview(field: &ScalarField, path: &Path) -> Result<(), PreviewError> {
    field_to_gray(field)?.save(path)?;
    log::debug!("wrote preview {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_stereo_core::INVALID;

    #[test]
    fn invalid_pixels_are_black_and_range_is_stretched() {
        let field = ScalarField::new(3, 1, vec![-4.0, INVALID, 6.0]).unwrap();
        let img = field_to_gray(&field).unwrap();
        assert_eq!(img.as_raw(), &vec![1, 0, 255]);
    }

    #[test]
    fn constant_and_dead_fields() {
        let flat = field_to_gray(&ScalarField::filled(2, 2, 3.0)).unwrap();
        assert!(flat.as_raw().iter().all(|&p| p == 128));
        let dead = field_to_gray(&ScalarField::invalid(2, 2)).unwrap();
        assert!(dead.as_raw().iter().all(|&p| p == 0));
    }

    #[test]
    fn writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        write_preview(&ScalarField::from_fn(4, 3, |x, y| (x + y) as f32), &path).unwrap();
        let img = ::image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (4, 3));
    }
}
