//! QR label printing pipeline for Brother QL series label printers.
//!
//! Renders a payload string and caption into a fixed-size label image and
//! delivers it to a USB-addressed QL printer as a native raster job:
//! QR encoding, caption composition, geometric normalization, raster
//! command encoding and a blocking USB transport, run once per copy.
//!
//! # Example
//!
//! ```rust,no_run
//! use ql_qr_print::{
//!     DeviceTarget, Media, Pipeline, PipelineConfig, PrintRequest, RasterOptions, Rotation,
//!     UsbPrinter,
//! };
//!
//! let target: DeviceTarget = "usb://04f9:209b".parse().unwrap();
//! let media = Media::from_code("29").unwrap();
//! let printer =
//!     UsbPrinter::open(&target, media, Rotation::Deg0, RasterOptions::default()).unwrap();
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), printer);
//! let request = PrintRequest {
//!     payload: "ABC123".to_string(),
//!     caption: "Widget".to_string(),
//!     copies: 1,
//! };
//! pipeline.run(&request).unwrap();
//! ```

mod code;
mod compose;
mod error;
mod glyphs;
mod media;
mod normalize;
mod pipeline;
mod raster;
mod transport;

pub use crate::{
    code::{encode, EncodedSymbol},
    compose::{compose, fit_caption, ComposedLabel, FontSource, LabelFont},
    error::{
        CompositionError, EncodingError, GeometryError, JobError, PipelineError, PrinterError,
        TransportError,
    },
    media::Media,
    normalize::{normalize, NormalizedLabel},
    pipeline::{Pipeline, PipelineConfig, PrintRequest},
    raster::{build_job, RasterJob, RasterOptions, Rotation},
    transport::{DeviceTarget, RasterTransport, Status, UsbPrinter},
};

/// Type alias for 1-bit raster rows.
///
/// Each inner `Vec<u8>` is one print line with 8 pixels packed per byte;
/// a full-width row is 90 bytes (720 pins / 8).
pub type Matrix = Vec<Vec<u8>>;

/// Print head width in dots for QL series printers.
pub const HEAD_WIDTH_DOTS: u32 = 720;

/// Bytes per packed raster row (720 pins / 8).
pub const ROW_BYTES: usize = 90;
