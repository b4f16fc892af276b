//! Caption composition.
//!
//! Overlays a human-readable caption below the QR symbol. The caption
//! starts at the maximum type size and shrinks in fixed steps until it
//! fits the symbol width or reaches the floor; overflow at the floor is
//! accepted output, not an error.

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{imageops, Rgb, RgbImage};
use log::{debug, warn};

use crate::code::EncodedSymbol;
use crate::error::CompositionError;
use crate::glyphs;

/// Largest caption type size tried, in pixels.
pub const MAX_CAPTION_PX: u32 = 100;
/// Smallest legible caption size; fitting never shrinks below this.
pub const MIN_CAPTION_PX: u32 = 10;
/// Fitting step between candidate sizes.
pub const CAPTION_STEP_PX: u32 = 10;
/// Vertical gap reserved between symbol and caption baseline block.
pub const VERTICAL_GAP_PX: u32 = 20;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Where the caption typeface comes from.
#[derive(Debug, Clone)]
pub enum FontSource {
    /// Explicit TTF/OTF file path.
    File(PathBuf),
    /// Probe well-known system font locations.
    System,
    /// The built-in 5x7 bitmap font.
    Builtin,
}

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A loaded caption typeface.
pub enum LabelFont {
    Ttf(FontArc),
    Builtin,
}

impl LabelFont {
    /// Resolve a font source, falling back down the chain
    /// file -> system -> built-in so composition never fails solely
    /// because a typeface asset is missing.
    pub fn load(source: &FontSource) -> Self {
        match source {
            FontSource::File(path) => match Self::from_file(path) {
                Ok(font) => font,
                Err(err) => {
                    warn!("font file {:?} not usable ({}), trying system fonts", path, err);
                    Self::load(&FontSource::System)
                }
            },
            FontSource::System => {
                for candidate in SYSTEM_FONT_PATHS {
                    if let Ok(font) = Self::from_file(Path::new(candidate)) {
                        debug!("using system font {}", candidate);
                        return font;
                    }
                }
                warn!("no system font found, using built-in bitmap font");
                LabelFont::Builtin
            }
            FontSource::Builtin => LabelFont::Builtin,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, CompositionError> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)?;
        Ok(LabelFont::Ttf(font))
    }

    /// Pixel width and height of `text` at the given type size.
    ///
    /// Empty text measures (0, 0), matching the layout rule that an
    /// empty caption contributes no height to the canvas.
    pub fn measure(&self, text: &str, size_px: u32) -> (u32, u32) {
        if text.is_empty() {
            return (0, 0);
        }
        match self {
            LabelFont::Ttf(font) => {
                let scaled = font.as_scaled(PxScale::from(size_px as f32));
                let width: f32 = text
                    .chars()
                    .map(|ch| scaled.h_advance(font.glyph_id(ch)))
                    .sum();
                let height = scaled.ascent() - scaled.descent();
                (width.ceil() as u32, height.ceil() as u32)
            }
            LabelFont::Builtin => {
                let scale = bitmap_scale(size_px);
                let count = text.chars().count() as u32;
                (count * glyphs::GLYPH_ADVANCE * scale, glyphs::GLYPH_HEIGHT * scale)
            }
        }
    }

    /// Draw `text` in black at `(x, y)` (top-left of the text block).
    fn draw(&self, canvas: &mut RgbImage, text: &str, size_px: u32, x: u32, y: u32) {
        match self {
            LabelFont::Ttf(font) => draw_ttf(font, canvas, text, size_px, x, y),
            LabelFont::Builtin => draw_bitmap(canvas, text, size_px, x, y),
        }
    }
}

fn bitmap_scale(size_px: u32) -> u32 {
    (size_px / glyphs::GLYPH_HEIGHT).max(1)
}

fn draw_ttf(font: &FontArc, canvas: &mut RgbImage, text: &str, size_px: u32, x: u32, y: u32) {
    let scale = PxScale::from(size_px as f32);
    let scaled = font.as_scaled(scale);
    let baseline = y as f32 + scaled.ascent();
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);

    let mut caret = x as f32;
    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        let glyph = glyph_id.with_scale_and_position(scale, point(caret, baseline));
        caret += scaled.h_advance(glyph_id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let cx = px as i32 + bounds.min.x as i32;
                let cy = py as i32 + bounds.min.y as i32;
                if coverage >= 0.5 && cx >= 0 && cx < width && cy >= 0 && cy < height {
                    canvas.put_pixel(cx as u32, cy as u32, BLACK);
                }
            });
        }
    }
}

fn draw_bitmap(canvas: &mut RgbImage, text: &str, size_px: u32, x: u32, y: u32) {
    let scale = bitmap_scale(size_px);
    let mut cursor = x;

    for ch in text.chars() {
        for (col, bits) in glyphs::columns(ch).iter().enumerate() {
            for row in 0..glyphs::GLYPH_HEIGHT {
                if bits >> row & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = cursor + col as u32 * scale + dx;
                        let py = y + row * scale + dy;
                        if px < canvas.width() && py < canvas.height() {
                            canvas.put_pixel(px, py, BLACK);
                        }
                    }
                }
            }
        }
        cursor += glyphs::GLYPH_ADVANCE * scale;
    }
}

/// The composed label canvas and the caption size that was settled on.
pub struct ComposedLabel {
    pub image: RgbImage,
    pub caption_px: u32,
}

impl ComposedLabel {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Pick the caption type size: the first candidate in
/// {100, 90, ..., 10} whose measured width fits `max_width`, or the
/// 10 px floor even if the caption still overflows.
pub fn fit_caption(max_width: u32, caption: &str, font: &LabelFont) -> u32 {
    let mut size = MAX_CAPTION_PX;
    while size > MIN_CAPTION_PX && font.measure(caption, size).0 > max_width {
        size -= CAPTION_STEP_PX;
    }
    size
}

/// Compose the symbol and caption into one white canvas.
///
/// The symbol is pasted top-center; the caption sits directly below it,
/// horizontally centered, with a 1 px seam overlap.
pub fn compose(
    symbol: &EncodedSymbol,
    caption: &str,
    font: &LabelFont,
) -> Result<ComposedLabel, CompositionError> {
    let caption_px = fit_caption(symbol.width(), caption, font);
    let (text_w, text_h) = font.measure(caption, caption_px);
    if text_w > symbol.width() {
        debug!(
            "caption overflows symbol width at the {} px floor ({} > {})",
            caption_px,
            text_w,
            symbol.width()
        );
    }

    let width = symbol.width().max(text_w);
    let height = symbol.height() + text_h + VERTICAL_GAP_PX;

    let mut image = RgbImage::from_pixel(width, height, WHITE);
    imageops::overlay(
        &mut image,
        &symbol.image,
        i64::from((width - symbol.width()) / 2),
        0,
    );

    if !caption.is_empty() {
        let text_x = (width - text_w.min(width)) / 2;
        let text_y = symbol.height() + 1;
        font.draw(&mut image, caption, caption_px, text_x, text_y);
    }

    Ok(ComposedLabel { image, caption_px })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::encode;
    use pretty_assertions::assert_eq;

    fn symbol() -> EncodedSymbol {
        encode("ABC123", 10, 10).unwrap()
    }

    #[test]
    fn canvas_is_never_narrower_than_symbol() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        for caption in &["", "W", "Widget", "a caption much longer than the symbol itself"] {
            let label = compose(&symbol, caption, &font).unwrap();
            assert!(label.width() >= symbol.width());
        }
    }

    #[test]
    fn chosen_size_is_always_a_candidate_step() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        for caption in &["", "x", "Widget", &"y".repeat(200)] {
            let label = compose(&symbol, caption, &font).unwrap();
            assert!(label.caption_px >= MIN_CAPTION_PX);
            assert!(label.caption_px <= MAX_CAPTION_PX);
            assert_eq!(label.caption_px % CAPTION_STEP_PX, 0);
        }
    }

    #[test]
    fn long_caption_stops_at_the_floor() {
        let font = LabelFont::Builtin;
        let caption = "W".repeat(500);
        let size = fit_caption(symbol().width(), &caption, &font);
        assert_eq!(size, MIN_CAPTION_PX);
        // Overflow is accepted: the canvas widens to the caption.
        let label = compose(&symbol(), &caption, &font).unwrap();
        assert!(label.width() > symbol().width());
    }

    #[test]
    fn short_caption_keeps_the_maximum_size() {
        let font = LabelFont::Builtin;
        assert_eq!(fit_caption(symbol().width(), "ab", &font), MAX_CAPTION_PX);
    }

    #[test]
    fn canvas_height_adds_caption_and_gap() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        let label = compose(&symbol, "Widget", &font).unwrap();
        let (_, text_h) = font.measure("Widget", label.caption_px);
        assert_eq!(label.height(), symbol.height() + text_h + VERTICAL_GAP_PX);
    }

    #[test]
    fn empty_caption_contributes_no_height() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        let label = compose(&symbol, "", &font).unwrap();
        assert_eq!(label.height(), symbol.height() + VERTICAL_GAP_PX);
        assert_eq!(label.width(), symbol.width());
    }

    #[test]
    fn composition_is_deterministic() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        let a = compose(&symbol, "Widget", &font).unwrap();
        let b = compose(&symbol, "Widget", &font).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn caption_pixels_are_drawn_below_the_symbol() {
        let font = LabelFont::Builtin;
        let symbol = symbol();
        let label = compose(&symbol, "Widget", &font).unwrap();
        let black_below = label
            .image
            .enumerate_pixels()
            .any(|(_, y, p)| y > symbol.height() && *p == Rgb([0, 0, 0]));
        assert!(black_below);
    }

    #[test]
    fn missing_font_file_falls_back_without_failing() {
        let font = LabelFont::load(&FontSource::File(PathBuf::from(
            "/nonexistent/font.ttf",
        )));
        // Whatever the fallback resolved to, it must measure and compose.
        let label = compose(&symbol(), "fallback", &font).unwrap();
        assert!(label.width() >= symbol().width());
    }
}
