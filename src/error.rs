//! Error types for the label print pipeline.
//!
//! Each pipeline stage has its own error enum; the orchestration layer
//! wraps whichever stage failed into a [`JobError`] carrying how many
//! copies had already completed.

use thiserror::Error;

/// Errors raised while encoding the QR symbol or building the raster job.
#[derive(Error, Debug)]
pub enum EncodingError {
    /// Payloads must be non-empty; checked before any image work.
    #[error("payload is empty")]
    EmptyPayload,

    /// The payload does not fit any QR symbol version at the configured
    /// error correction level.
    #[error(transparent)]
    Qr(#[from] qrcode::types::QrError),

    #[error("unsupported media profile code: {0:?}")]
    UnsupportedMedia(String),

    /// Die-cut media has a fixed printable frame; the bitmap must match it.
    #[error("image is {width}x{height} but media {media:?} expects {expected} printable dots")]
    ImageDimensions {
        width: u32,
        height: u32,
        media: String,
        expected: u32,
    },

    #[error("invalid raster option: {0}")]
    InvalidOptions(String),
}

/// Errors raised while composing the caption onto the symbol.
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("failed to read font file: {0}")]
    FontFile(#[from] std::io::Error),

    #[error("invalid font data: {0}")]
    FontData(#[from] ab_glyph::InvalidFont),
}

/// Errors raised while normalizing the composed label to label dimensions.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("source bitmap has degenerate dimensions {0}x{1}")]
    EmptyImage(u32, u32),
}

/// Errors raised while delivering a raster job over USB.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Wraps underlying rusb errors for device communication issues,
    /// timeouts, or permission problems.
    #[error(transparent)]
    Usb(#[from] rusb::Error),

    #[error("malformed device target {0:?}, expected usb://vvvv:pppp[/serial]")]
    InvalidTarget(String),

    #[error("device is offline")]
    DeviceOffline,

    #[error("can't read device list, permission issue ?")]
    DeviceListNotReadable,

    #[error("device is missing a bulk endpoint")]
    MissingEndpoint,

    /// The bulk write returned before the whole buffer was accepted.
    #[error("short write: {written} of {expected} bytes, possibly timeout ?")]
    ShortWrite { written: usize, expected: usize },

    #[error("status request returned no response")]
    ReadStatusTimeout,

    #[error("print job timed out waiting for completion")]
    PrintTimeout,

    /// Media mismatch between the configured profile and the installed tape.
    #[error("media mismatch: expected {expected:?}, found {actual:?}")]
    MediaMismatch {
        expected: String,
        actual: Option<String>,
    },

    /// Hardware-level fault reported in the printer status.
    #[error(transparent)]
    Printer(#[from] PrinterError),
}

/// Any single-copy pipeline failure, tagged by the stage that raised it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Terminal failure of a print job.
///
/// Copies `1..=completed` were already delivered to the printer and stay
/// printed; the remaining copies were aborted.
#[derive(Error, Debug)]
#[error("{completed} of {requested} copies completed: {source}")]
pub struct JobError {
    pub completed: u32,
    pub requested: u32,
    #[source]
    pub source: PipelineError,
}

/// Hardware-specific errors reported by the printer.
///
/// Parsed from bytes 8 and 9 of the 32-byte status response; these
/// indicate physical problems that need user intervention.
#[derive(Error, Debug)]
pub enum PrinterError {
    #[error("no media is installed")]
    NoMedia,

    #[error("end of media")]
    EndOfMedia,

    #[error("cutter jam")]
    CutterJam,

    #[error("printer is in use")]
    PrinterInUse,

    #[error("printer is offline")]
    PrinterOffline,

    #[error("installed media does not match")]
    InvalidMedia,

    #[error("expansion buffer is full")]
    BufferFull,

    #[error("communication error")]
    CommunicationError,

    #[error("cover is open")]
    CoverOpen,

    #[error("media can not be fed")]
    FeedMediaFail,

    #[error("system error")]
    SystemError,

    #[error("unknown error")]
    UnknownError((u8, u8)),
}

impl PrinterError {
    pub fn from_buf(buf: [u8; 32]) -> Self {
        let err_1 = buf[8];
        let err_2 = buf[9];

        match err_1 {
            0b0000_0001 => Self::NoMedia,
            0b0000_0010 => Self::EndOfMedia,
            0b0000_0100 => Self::CutterJam,
            0b0001_0000 => Self::PrinterInUse,
            0b0010_0000 => Self::PrinterOffline,
            _ => match err_2 {
                0b0000_0001 => Self::InvalidMedia,
                0b0000_0010 => Self::BufferFull,
                0b0000_0100 => Self::CommunicationError,
                0b0001_0000 => Self::CoverOpen,
                0b0100_0000 => Self::FeedMediaFail,
                0b1000_0000 => Self::SystemError,
                _ => Self::UnknownError((err_1, err_2)),
            },
        }
    }

    /// `true` if the status bytes carry no error condition at all.
    pub fn is_no_error(&self) -> bool {
        matches!(self, Self::UnknownError((0, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_bits_decode() {
        let mut buf = [0u8; 32];
        buf[8] = 0b0000_0001;
        assert!(matches!(PrinterError::from_buf(buf), PrinterError::NoMedia));

        let mut buf = [0u8; 32];
        buf[9] = 0b0001_0000;
        assert!(matches!(
            PrinterError::from_buf(buf),
            PrinterError::CoverOpen
        ));
    }

    #[test]
    fn clean_status_is_no_error() {
        let buf = [0u8; 32];
        assert!(PrinterError::from_buf(buf).is_no_error());
    }

    #[test]
    fn job_error_reports_copy_counts() {
        let err = JobError {
            completed: 1,
            requested: 3,
            source: PipelineError::Encoding(EncodingError::EmptyPayload),
        };
        assert_eq!(err.to_string(), "1 of 3 copies completed: payload is empty");
    }
}
