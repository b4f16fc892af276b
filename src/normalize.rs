//! Geometric normalization to the printer's physical label size.
//!
//! The composed canvas is resampled to the target label dimensions with a
//! Lanczos filter (never nearest-neighbor, which would chew up module
//! edges and hurt scannability), then pasted at the top-left of a white
//! canvas that adds the blank trailing margin the raster format expects.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};

use crate::compose::ComposedLabel;
use crate::error::GeometryError;

/// A bitmap forced to exactly the label dimensions plus trailing margin.
pub struct NormalizedLabel {
    pub image: RgbImage,
}

impl NormalizedLabel {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Resample `label` to `target_size` and pad `trailing_margin` blank rows.
///
/// Resample-then-pad, never crop-then-stretch: the scannable region keeps
/// its aspect treatment uniform in both axes of the resize.
pub fn normalize(
    label: &ComposedLabel,
    target_size: (u32, u32),
    trailing_margin: u32,
) -> Result<NormalizedLabel, GeometryError> {
    let (target_w, target_h) = target_size;
    if label.width() == 0 || label.height() == 0 {
        return Err(GeometryError::EmptyImage(label.width(), label.height()));
    }
    if target_w == 0 || target_h == 0 {
        return Err(GeometryError::EmptyImage(target_w, target_h));
    }

    let resized = imageops::resize(&label.image, target_w, target_h, FilterType::Lanczos3);

    let mut image = RgbImage::from_pixel(
        target_w,
        target_h + trailing_margin,
        Rgb([255, 255, 255]),
    );
    imageops::overlay(&mut image, &resized, 0, 0);

    Ok(NormalizedLabel { image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::encode;
    use crate::compose::{compose, LabelFont};
    use pretty_assertions::assert_eq;

    fn composed(payload: &str, caption: &str) -> ComposedLabel {
        let symbol = encode(payload, 10, 10).unwrap();
        compose(&symbol, caption, &LabelFont::Builtin).unwrap()
    }

    #[test]
    fn output_is_exactly_target_plus_margin() {
        // Wildly different input aspect ratios all land on 500x505.
        for (payload, caption) in &[
            ("ABC123", "Widget"),
            ("x", ""),
            ("ABC123", &"W".repeat(300) as &str),
        ] {
            let label = normalize(&composed(payload, caption), (500, 500), 5).unwrap();
            assert_eq!((label.width(), label.height()), (500, 505));
        }
    }

    #[test]
    fn trailing_margin_stays_blank() {
        let label = normalize(&composed("ABC123", "Widget"), (500, 500), 5).unwrap();
        for y in 500..505 {
            for x in 0..500 {
                assert_eq!(*label.image.get_pixel(x, y), Rgb([255, 255, 255]));
            }
        }
    }

    #[test]
    fn degenerate_target_is_a_geometry_error() {
        let label = composed("ABC123", "");
        assert!(matches!(
            normalize(&label, (0, 500), 5),
            Err(GeometryError::EmptyImage(_, _))
        ));
    }

    #[test]
    fn normalization_is_deterministic() {
        let a = normalize(&composed("ABC123", "Widget"), (500, 500), 5).unwrap();
        let b = normalize(&composed("ABC123", "Widget"), (500, 500), 5).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }
}
