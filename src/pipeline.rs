//! Print job orchestration.
//!
//! Drives encode -> compose -> normalize -> raster -> send once per
//! requested copy, strictly sequentially. The first failure aborts the
//! remaining copies; copies already delivered stay printed and their
//! count is part of the reported error.

use log::info;

use crate::code;
use crate::compose::{self, FontSource, LabelFont};
use crate::error::{JobError, PipelineError};
use crate::normalize;
use crate::transport::RasterTransport;

/// One inbound print job. Immutable; consumed once.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub payload: String,
    pub caption: String,
    pub copies: u32,
}

/// Rendering parameters for the pipeline.
///
/// Everything here is deployment configuration, not a constant: media
/// profile and orientation travel with the transport, which owns the
/// device protocol parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pixels per QR module.
    pub module_size: u32,
    /// Quiet zone width in modules.
    pub quiet_zone: u32,
    pub font: FontSource,
    /// Physical label raster dimensions in pixels.
    pub label_size: (u32, u32),
    /// Blank rows appended below the label, required by the raster format.
    pub trailing_margin: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            module_size: 10,
            quiet_zone: 10,
            font: FontSource::System,
            label_size: (500, 500),
            trailing_margin: 5,
        }
    }
}

/// The label print pipeline bound to one transport.
///
/// `run` takes `&mut self`, so a pipeline shared between threads must sit
/// behind a mutex; the printer cannot interleave raw writes.
pub struct Pipeline<T: RasterTransport> {
    config: PipelineConfig,
    font: LabelFont,
    transport: T,
}

impl<T: RasterTransport> Pipeline<T> {
    pub fn new(config: PipelineConfig, transport: T) -> Self {
        let font = LabelFont::load(&config.font);
        Pipeline {
            config,
            font,
            transport,
        }
    }

    /// Print all requested copies, returning how many were delivered.
    ///
    /// A request for zero copies is a no-op that succeeds, matching the
    /// HTTP collaborator's default-count behavior.
    pub fn run(&mut self, request: &PrintRequest) -> Result<u32, JobError> {
        let mut completed = 0;
        for copy in 1..=request.copies {
            self.print_one(request).map_err(|source| JobError {
                completed,
                requested: request.copies,
                source,
            })?;
            completed = copy;
            info!("printed copy {} of {}", copy, request.copies);
        }
        Ok(completed)
    }

    fn print_one(&mut self, request: &PrintRequest) -> Result<(), PipelineError> {
        let symbol = code::encode(
            &request.payload,
            self.config.module_size,
            self.config.quiet_zone,
        )?;
        let label = compose::compose(&symbol, &request.caption, &self.font)?;
        let normalized = normalize::normalize(
            &label,
            self.config.label_size,
            self.config.trailing_margin,
        )?;
        // The frame is fully encoded before the transport write begins.
        let job = self.transport.encode(&normalized)?;
        self.transport.send(job)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodingError, TransportError};
    use crate::media::Media;
    use crate::normalize::NormalizedLabel;
    use crate::raster::{build_job, RasterJob, RasterOptions, Rotation};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts calls and optionally fails the n-th send.
    struct ScriptedTransport {
        encodes: Cell<u32>,
        sends: u32,
        fail_on_send: Option<u32>,
    }

    impl ScriptedTransport {
        fn new(fail_on_send: Option<u32>) -> Self {
            ScriptedTransport {
                encodes: Cell::new(0),
                sends: 0,
                fail_on_send,
            }
        }
    }

    impl RasterTransport for ScriptedTransport {
        fn encode(&self, label: &NormalizedLabel) -> Result<RasterJob, EncodingError> {
            self.encodes.set(self.encodes.get() + 1);
            build_job(label, Media::Continuous29, Rotation::Deg0, &RasterOptions::default())
        }

        fn send(&mut self, _job: RasterJob) -> Result<(), TransportError> {
            self.sends += 1;
            if self.fail_on_send == Some(self.sends) {
                Err(TransportError::DeviceOffline)
            } else {
                Ok(())
            }
        }
    }

    fn request(payload: &str, copies: u32) -> PrintRequest {
        PrintRequest {
            payload: payload.to_string(),
            caption: "Widget".to_string(),
            copies,
        }
    }

    fn pipeline(transport: ScriptedTransport) -> Pipeline<ScriptedTransport> {
        let config = PipelineConfig {
            font: FontSource::Builtin,
            ..Default::default()
        };
        Pipeline::new(config, transport)
    }

    #[test]
    fn all_copies_print_in_order() {
        let mut pipeline = pipeline(ScriptedTransport::new(None));
        assert_eq!(pipeline.run(&request("ABC123", 2)).unwrap(), 2);
        assert_eq!(pipeline.transport.sends, 2);
        assert_eq!(pipeline.transport.encodes.get(), 2);
    }

    #[test]
    fn failure_mid_job_aborts_remaining_copies() {
        let mut pipeline = pipeline(ScriptedTransport::new(Some(2)));
        let err = pipeline.run(&request("ABC123", 3)).unwrap_err();
        assert_eq!(err.completed, 1);
        assert_eq!(err.requested, 3);
        assert!(matches!(
            err.source,
            PipelineError::Transport(TransportError::DeviceOffline)
        ));
        // The third copy was never attempted.
        assert_eq!(pipeline.transport.sends, 2);
        assert_eq!(pipeline.transport.encodes.get(), 2);
        assert_eq!(err.to_string(), format!("1 of 3 copies completed: {}", TransportError::DeviceOffline));
    }

    #[test]
    fn empty_payload_fails_before_any_image_work() {
        let mut pipeline = pipeline(ScriptedTransport::new(None));
        let err = pipeline.run(&request("", 2)).unwrap_err();
        assert_eq!(err.completed, 0);
        assert!(matches!(
            err.source,
            PipelineError::Encoding(EncodingError::EmptyPayload)
        ));
        assert_eq!(pipeline.transport.encodes.get(), 0);
        assert_eq!(pipeline.transport.sends, 0);
    }

    #[test]
    fn zero_copies_is_a_successful_no_op() {
        let mut pipeline = pipeline(ScriptedTransport::new(None));
        assert_eq!(pipeline.run(&request("ABC123", 0)).unwrap(), 0);
        assert_eq!(pipeline.transport.sends, 0);
    }

    /// Detects overlapping send windows on a shared device.
    struct OverlapGuard {
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
        sends: Arc<AtomicU32>,
    }

    impl RasterTransport for OverlapGuard {
        fn encode(&self, label: &NormalizedLabel) -> Result<RasterJob, EncodingError> {
            build_job(label, Media::Continuous29, Rotation::Deg0, &RasterOptions::default())
        }

        fn send(&mut self, _job: RasterJob) -> Result<(), TransportError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.in_flight.store(false, Ordering::SeqCst);
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn mutex_guarded_pipeline_never_interleaves_writes() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let sends = Arc::new(AtomicU32::new(0));
        let guard = OverlapGuard {
            in_flight: Arc::new(AtomicBool::new(false)),
            overlapped: overlapped.clone(),
            sends: sends.clone(),
        };
        let config = PipelineConfig {
            font: FontSource::Builtin,
            ..Default::default()
        };
        let pipeline = Arc::new(Mutex::new(Pipeline::new(config, guard)));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    let req = request("ABC123", 2);
                    pipeline.lock().unwrap().run(&req).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sends.load(Ordering::SeqCst), 4);
        assert!(!overlapped.load(Ordering::SeqCst));
    }
}
