//! QR symbol encoding.
//!
//! Turns a payload string into a black-on-white RGB bitmap, scaled to a
//! configurable module size with a configurable quiet zone. The symbol
//! version is always the smallest one that fits the payload.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use log::debug;
use qrcode::{EcLevel, QrCode};

use crate::error::EncodingError;

/// A rendered QR symbol plus the parameters it was rendered with.
///
/// The bitmap is strictly black-on-white and 3-channel so every later
/// compositing step works in one colorspace.
pub struct EncodedSymbol {
    pub image: RgbImage,
    /// Pixels per QR module.
    pub module_size: u32,
    /// Quiet zone width in modules.
    pub quiet_zone: u32,
    pub ec_level: EcLevel,
}

impl EncodedSymbol {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Encode `payload` as a QR symbol at error correction level L.
///
/// `module_size` must be positive; `quiet_zone` may be zero. Fails before
/// any image work when the payload is empty, and when the payload exceeds
/// the capacity of the largest symbol version.
pub fn encode(
    payload: &str,
    module_size: u32,
    quiet_zone: u32,
) -> Result<EncodedSymbol, EncodingError> {
    if payload.is_empty() {
        return Err(EncodingError::EmptyPayload);
    }

    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)?;
    debug!(
        "payload of {} bytes fits QR version {:?}, {} modules per side",
        payload.len(),
        code.version(),
        code.width()
    );

    // Render without the built-in quiet zone; the border is padded on
    // below so its width in modules stays a free parameter.
    let modules = code
        .render::<image::Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(module_size, module_size)
        .build();
    let modules = DynamicImage::ImageLuma8(modules).into_rgb8();

    let border_px = quiet_zone * module_size;
    let side_w = modules.width() + 2 * border_px;
    let side_h = modules.height() + 2 * border_px;

    let mut image = RgbImage::from_pixel(side_w, side_h, Rgb([255, 255, 255]));
    imageops::overlay(&mut image, &modules, i64::from(border_px), i64::from(border_px));

    Ok(EncodedSymbol {
        image,
        module_size,
        quiet_zone,
        ec_level: EcLevel::L,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_payload_fails_before_rendering() {
        assert!(matches!(
            encode("", 10, 10),
            Err(EncodingError::EmptyPayload)
        ));
    }

    #[test]
    fn symbol_dimensions_follow_module_and_border() {
        let symbol = encode("ABC123", 10, 10).unwrap();
        let modules = QrCode::with_error_correction_level(b"ABC123", EcLevel::L)
            .unwrap()
            .width() as u32;
        assert_eq!(symbol.width(), (modules + 2 * 10) * 10);
        assert_eq!(symbol.height(), symbol.width());
    }

    #[test]
    fn symbol_is_strictly_black_and_white() {
        let symbol = encode("https://example.com/a/b?c=1", 4, 2).unwrap();
        assert!(symbol
            .image
            .pixels()
            .all(|p| *p == Rgb([0, 0, 0]) || *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn rendered_symbol_decodes_back_to_the_payload() {
        for payload in &["ABC123", "https://example.com/widgets/42?rev=7"] {
            let symbol = encode(payload, 4, 4).unwrap();
            let gray = DynamicImage::ImageRgb8(symbol.image.clone()).into_luma8();
            let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
                gray.width() as usize,
                gray.height() as usize,
                |x, y| gray.get_pixel(x as u32, y as u32)[0],
            );
            let grids = prepared.detect_grids();
            assert_eq!(grids.len(), 1, "no single grid found for {:?}", payload);
            let (_, content) = grids[0].decode().unwrap();
            assert_eq!(content, *payload);
        }
    }

    #[test]
    fn zero_quiet_zone_is_allowed() {
        let symbol = encode("x", 3, 0).unwrap();
        let modules = QrCode::with_error_correction_level(b"x", EcLevel::L)
            .unwrap()
            .width() as u32;
        assert_eq!(symbol.width(), modules * 3);
    }

    #[test]
    fn oversized_payload_is_an_encoding_error() {
        let payload = "A".repeat(8000);
        assert!(matches!(
            encode(&payload, 10, 10),
            Err(EncodingError::Qr(_))
        ));
    }
}
