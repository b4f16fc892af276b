//! Label media profiles.
//!
//! Geometry table for the QL tape stocks this pipeline supports:
//! physical tape width in dots across the 720-pin head, blank margins,
//! unprintable pin offsets and (for die-cut stock) the fixed label
//! length. Profiles are selected by their label code (the string the
//! media cassette is sold under, e.g. "29" or "62x29").

use crate::error::EncodingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Media {
    Continuous12,
    Continuous29,
    Continuous38,
    Continuous50,
    Continuous54,
    Continuous62,

    DieCut29x90,
    DieCut62x29,
    DieCut62x100,
}

struct MediaSize {
    mm: u8,
    dots: u32,
}

struct MediaSpec {
    width: MediaSize,
    length: Option<MediaSize>,
    margin: MediaSize,
    /// Blank length margin at each end of a die-cut label.
    offset: Option<MediaSize>,
    pins_right: u32,
}

impl MediaSpec {
    fn pins_left(&self) -> u32 {
        720 - self.width.dots - self.pins_right
    }
}

/// Default feed for continuous tape, in dots.
const CONTINUOUS_FEED_DOTS: u16 = 35;
const CONTINUOUS_FEED_MAX: u16 = 1500;

impl Media {
    fn spec(&self) -> MediaSpec {
        match self {
            Self::Continuous12 => MediaSpec {
                width: MediaSize { mm: 12, dots: 142 },
                length: None,
                margin: MediaSize { mm: 2, dots: 18 },
                offset: None,
                pins_right: 29,
            },
            Self::Continuous29 => MediaSpec {
                width: MediaSize { mm: 29, dots: 342 },
                length: None,
                margin: MediaSize { mm: 2, dots: 18 },
                offset: None,
                pins_right: 6,
            },
            Self::Continuous38 => MediaSpec {
                width: MediaSize { mm: 38, dots: 449 },
                length: None,
                margin: MediaSize { mm: 2, dots: 18 },
                offset: None,
                pins_right: 12,
            },
            Self::Continuous50 => MediaSpec {
                width: MediaSize { mm: 50, dots: 590 },
                length: None,
                margin: MediaSize { mm: 2, dots: 18 },
                offset: None,
                pins_right: 12,
            },
            Self::Continuous54 => MediaSpec {
                width: MediaSize { mm: 54, dots: 636 },
                length: None,
                margin: MediaSize { mm: 2, dots: 23 },
                offset: None,
                pins_right: 0,
            },
            Self::Continuous62 => MediaSpec {
                width: MediaSize { mm: 62, dots: 732 },
                length: None,
                margin: MediaSize { mm: 2, dots: 18 },
                offset: None,
                pins_right: 12,
            },
            Self::DieCut29x90 => MediaSpec {
                width: MediaSize { mm: 29, dots: 342 },
                length: Some(MediaSize { mm: 90, dots: 1061 }),
                margin: MediaSize { mm: 2, dots: 18 },
                offset: Some(MediaSize { mm: 3, dots: 35 }),
                pins_right: 6,
            },
            Self::DieCut62x29 => MediaSpec {
                width: MediaSize { mm: 62, dots: 732 },
                length: Some(MediaSize { mm: 29, dots: 341 }),
                margin: MediaSize { mm: 2, dots: 18 },
                offset: Some(MediaSize { mm: 3, dots: 35 }),
                pins_right: 12,
            },
            Self::DieCut62x100 => MediaSpec {
                width: MediaSize { mm: 62, dots: 732 },
                length: Some(MediaSize { mm: 100, dots: 1179 }),
                margin: MediaSize { mm: 3, dots: 35 },
                offset: Some(MediaSize { mm: 3, dots: 35 }),
                pins_right: 12,
            },
        }
    }

    /// Look up a profile by its label code.
    pub fn from_code(code: &str) -> Result<Self, EncodingError> {
        match code.trim() {
            "12" => Ok(Self::Continuous12),
            "29" => Ok(Self::Continuous29),
            "38" => Ok(Self::Continuous38),
            "50" => Ok(Self::Continuous50),
            "54" => Ok(Self::Continuous54),
            "62" => Ok(Self::Continuous62),
            "29x90" => Ok(Self::DieCut29x90),
            "62x29" => Ok(Self::DieCut62x29),
            "62x100" => Ok(Self::DieCut62x100),
            other => Err(EncodingError::UnsupportedMedia(other.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Continuous12 => "12",
            Self::Continuous29 => "29",
            Self::Continuous38 => "38",
            Self::Continuous50 => "50",
            Self::Continuous54 => "54",
            Self::Continuous62 => "62",
            Self::DieCut29x90 => "29x90",
            Self::DieCut62x29 => "62x29",
            Self::DieCut62x100 => "62x100",
        }
    }

    /// Decode the installed media from a 32-byte printer status report.
    ///
    /// Byte 10 is the tape width in mm, byte 11 the media type and
    /// byte 17 the die-cut length in mm.
    pub fn from_buf(buf: [u8; 32]) -> Option<Self> {
        let w = buf[10];
        let t = buf[11];
        let l = buf[17];

        match t {
            // Document says 0x4A but the actual value is 0x0A
            0x0A => match w {
                12 => Some(Self::Continuous12),
                29 => Some(Self::Continuous29),
                38 => Some(Self::Continuous38),
                50 => Some(Self::Continuous50),
                54 => Some(Self::Continuous54),
                62 => Some(Self::Continuous62),
                _ => None,
            },
            // Same as above, 0x0B not 0x4B
            0x0B => match (w, l) {
                (29, 90) => Some(Self::DieCut29x90),
                (62, 29) => Some(Self::DieCut62x29),
                (62, 100) => Some(Self::DieCut62x100),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_die_cut(&self) -> bool {
        self.spec().length.is_some()
    }

    /// Printable dots across the tape width.
    pub fn printable_dots(&self) -> u32 {
        let spec = self.spec();
        spec.width.dots - spec.margin.dots * 2
    }

    /// Printable dots along a die-cut label, `None` for continuous tape.
    pub fn printable_length(&self) -> Option<u32> {
        let spec = self.spec();
        match (&spec.length, &spec.offset) {
            (Some(length), Some(offset)) => Some(length.dots - offset.dots * 2),
            _ => None,
        }
    }

    /// Leftmost printable pin on the 720-pin head.
    pub fn print_offset(&self) -> u32 {
        let spec = self.spec();
        spec.pins_left() + spec.margin.dots
    }

    pub fn default_feed_dots(&self) -> u16 {
        if self.is_die_cut() {
            0
        } else {
            CONTINUOUS_FEED_DOTS
        }
    }

    /// Validate a feed amount and return it as the two ESC i d bytes.
    pub fn check_feed_value(&self, feed: u16) -> Result<[u8; 2], String> {
        if self.is_die_cut() {
            if feed != 0 {
                return Err(format!(
                    "die-cut media {:?} requires a feed of 0 dots, got {}",
                    self.code(),
                    feed
                ));
            }
        } else if feed < CONTINUOUS_FEED_DOTS || feed > CONTINUOUS_FEED_MAX {
            return Err(format!(
                "continuous media feed must be within {}..={} dots, got {}",
                CONTINUOUS_FEED_DOTS, CONTINUOUS_FEED_MAX, feed
            ));
        }
        Ok(feed.to_le_bytes())
    }

    /// Append the print information command (ESC i z) for this media and
    /// raster line count.
    pub fn write_print_info(&self, buf: &mut Vec<u8>, lines: u32, first_page: bool) {
        let spec = self.spec();

        // Valid flags: media kind + width (+ length for die-cut) + recover
        let mut flags: u8 = 0x02 | 0x04 | 0x80;
        let (media_type, length_mm) = match &spec.length {
            Some(length) => {
                flags |= 0x08;
                (0x0B, length.mm)
            }
            None => (0x0A, 0),
        };

        buf.extend_from_slice(&[0x1B, 0x69, 0x7A]);
        buf.extend_from_slice(&[flags, media_type, spec.width.mm, length_mm]);
        buf.extend_from_slice(&lines.to_le_bytes());
        buf.extend_from_slice(&[if first_page { 0x00 } else { 0x01 }, 0x00]);
    }
}
