//! QL raster command stream encoding.
//!
//! Builds one complete, finite command frame per label: invalidate and
//! initialize, raster mode select, compression select, feed / cut /
//! expanded mode settings, print information for the media, the packed
//! raster rows and the final print-and-eject control. Encoding always
//! finishes before any transport write begins; the device protocol needs
//! a well-formed frame, not a stream.

use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage};
use log::{debug, warn};

use crate::error::EncodingError;
use crate::media::Media;
use crate::normalize::NormalizedLabel;
use crate::{Matrix, HEAD_WIDTH_DOTS, ROW_BYTES};

/// Label orientation applied before raster packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        match self {
            Self::Deg0 => image.clone(),
            Self::Deg90 => imageops::rotate90(image),
            Self::Deg180 => imageops::rotate180(image),
            Self::Deg270 => imageops::rotate270(image),
        }
    }
}

/// Raster frame settings beyond the media profile itself.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Cut after every n labels, or never.
    pub auto_cut: Option<u8>,
    pub cut_at_end: bool,
    pub high_resolution: bool,
    /// PackBits row compression (mode 0x02).
    pub compress: bool,
    /// Feed amount in dots; `None` uses the media default.
    pub feed: Option<u16>,
    /// Luma threshold for black; 80 works well for monochrome sources.
    pub threshold: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        RasterOptions {
            auto_cut: Some(1),
            cut_at_end: true,
            high_resolution: false,
            compress: false,
            feed: None,
            threshold: 80,
        }
    }
}

/// A complete raster command frame for one label.
///
/// Immutable once built and consumed exactly once by the transport.
#[derive(Debug)]
pub struct RasterJob {
    data: Vec<u8>,
    lines: u32,
}

impl RasterJob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of raster lines in the frame.
    pub fn lines(&self) -> u32 {
        self.lines
    }
}

/// Encode a normalized label into the printer's raster command stream.
pub fn build_job(
    label: &NormalizedLabel,
    media: Media,
    rotation: Rotation,
    opts: &RasterOptions,
) -> Result<RasterJob, EncodingError> {
    let rotated = rotation.apply(&label.image);
    let gray = DynamicImage::ImageRgb8(rotated).into_luma8();
    let gray = fit_to_media(gray, media)?;
    let lines = gray.height();

    let rows = pack_rows(&gray, media.print_offset(), opts.threshold);

    let mut data: Vec<u8> = Vec::with_capacity(512 + rows.len() * (ROW_BYTES + 3));

    // Invalidate (flush any partial command left in the printer) then
    // initialize.
    data.extend_from_slice(&[0x00; 400]);
    data.extend_from_slice(&[0x1B, 0x40]);
    // Switch to raster command mode.
    data.extend_from_slice(&[0x1B, 0x69, 0x61, 0x01]);
    // Disable automatic status notification.
    data.extend_from_slice(&[0x1B, 0x69, 0x21, 0x00]);
    // Compression mode select.
    data.extend_from_slice(&[0x4D, if opts.compress { 0x02 } else { 0x00 }]);

    // Feed amount in dots (ESC i d).
    let feed = opts.feed.unwrap_or_else(|| media.default_feed_dots());
    let feed = media
        .check_feed_value(feed)
        .map_err(EncodingError::InvalidOptions)?;
    data.extend_from_slice(&[0x1B, 0x69, 0x64]);
    data.extend_from_slice(&feed);

    // Various mode (ESC i M) and auto cut interval (ESC i A).
    let mut various_mode: u8 = 0b0000_0000;
    let mut auto_cut_num: u8 = 1;
    if let Some(n) = opts.auto_cut {
        various_mode |= 0b0100_0000;
        auto_cut_num = n;
    }
    data.extend_from_slice(&[0x1B, 0x69, 0x4D, various_mode]);
    data.extend_from_slice(&[0x1B, 0x69, 0x41, auto_cut_num]);

    // Expanded mode (ESC i K).
    let mut expanded_mode: u8 = 0b0000_0000;
    if opts.cut_at_end {
        expanded_mode |= 0b0000_1000;
    }
    if opts.high_resolution {
        expanded_mode |= 0b0100_0000;
    }
    data.extend_from_slice(&[0x1B, 0x69, 0x4B, expanded_mode]);

    // Print information (ESC i z) with the raster line count.
    media.write_print_info(&mut data, lines, true);

    for row in rows {
        if opts.compress {
            let packed = pack_bits(&row);
            data.extend_from_slice(&[0x67, 0x00, packed.len() as u8]);
            data.extend_from_slice(&packed);
        } else {
            data.extend_from_slice(&[0x67, 0x00, ROW_BYTES as u8]);
            data.extend_from_slice(&row);
        }
    }

    // Control-Z: print then eject.
    data.push(0x1A);

    debug!(
        "raster job: {} lines on media {:?}, {} bytes",
        lines,
        media.code(),
        data.len()
    );

    Ok(RasterJob { data, lines })
}

/// Fit the bitmap to the media's printable dot range.
///
/// Continuous tape rescales a mismatched width, preserving aspect ratio.
/// Die-cut stock has a fixed frame, so a mismatch is rejected.
fn fit_to_media(gray: GrayImage, media: Media) -> Result<GrayImage, EncodingError> {
    let printable = media.printable_dots();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(EncodingError::ImageDimensions {
            width: w,
            height: h,
            media: media.code().to_string(),
            expected: printable,
        });
    }

    if media.is_die_cut() {
        let length = media.printable_length().unwrap_or(0);
        if w != printable || h != length {
            return Err(EncodingError::ImageDimensions {
                width: w,
                height: h,
                media: media.code().to_string(),
                expected: printable,
            });
        }
        return Ok(gray);
    }

    if w == printable {
        return Ok(gray);
    }

    let scaled_h = ((u64::from(h) * u64::from(printable) + u64::from(w) / 2) / u64::from(w)) as u32;
    warn!(
        "rescaling {}x{} image to printable width {} of media {:?}",
        w,
        h,
        printable,
        media.code()
    );
    Ok(imageops::resize(
        &gray,
        printable,
        scaled_h.max(1),
        FilterType::Lanczos3,
    ))
}

/// Pack grayscale rows into 1-bit raster rows across the full print head.
///
/// The head is 720 pins wide (90 bytes per row); the image is placed at
/// the media's pin offset and thresholded, with the bit order mirrored
/// the way the head expects.
fn pack_rows(gray: &GrayImage, x_offset: u32, threshold: u8) -> Matrix {
    let mut head = GrayImage::from_pixel(HEAD_WIDTH_DOTS, gray.height(), Luma([255]));
    imageops::overlay(&mut head, gray, i64::from(x_offset), 0);

    let length = head.height();
    let bytes = head.into_raw();
    let width = HEAD_WIDTH_DOTS;

    let mut bw: Matrix = Vec::with_capacity(length as usize);
    for y in 0..length {
        let mut buf: Vec<u8> = Vec::with_capacity(ROW_BYTES);
        for x in 0..(width / 8) {
            let index = (1 + y) * width - (1 + x) * 8;
            let mut tmp: u8 = 0x00;
            for i in 0..8 {
                let pixel = bytes[(index + i) as usize];
                let value: u8 = if pixel > threshold { 0 } else { 1 };
                tmp |= value << i;
            }
            buf.push(tmp);
        }
        bw.push(buf);
    }
    bw
}

/// PackBits run-length compression for one raster row.
fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let mut run_length = 1;
        let run_value = data[i];

        while i + run_length < data.len() && run_length < ROW_BYTES && data[i + run_length] == run_value
        {
            run_length += 1;
        }

        if run_length > 1 {
            packed.push(-(run_length as i8 - 1) as u8);
            packed.push(run_value);
            i += run_length;
        } else {
            let mut literal_run = 1;
            while i + literal_run < data.len()
                && literal_run < ROW_BYTES
                && (literal_run >= run_length
                    || data[i + literal_run] != data[i + literal_run - run_length])
            {
                literal_run += 1;
            }

            packed.push(literal_run as u8 - 1);
            packed.extend_from_slice(&data[i..i + literal_run]);
            i += literal_run;
        }
    }

    packed
}
