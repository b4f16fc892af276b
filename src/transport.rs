//! USB delivery of raster jobs.
//!
//! [`RasterTransport`] is the narrow boundary to the printer protocol:
//! `encode` turns a normalized label into a device job and `send`
//! delivers it, blocking until the device has accepted the job or
//! reported a fault. [`UsbPrinter`] is the rusb implementation for QL
//! printers; tests substitute their own doubles.

use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};

use crate::error::{EncodingError, PrinterError, TransportError};
use crate::media::Media;
use crate::normalize::NormalizedLabel;
use crate::raster::{build_job, RasterJob, RasterOptions, Rotation};

/// USB address of exactly one physical printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Disambiguates multiple printers of the same model.
    pub serial: Option<String>,
}

impl FromStr for DeviceTarget {
    type Err = TransportError;

    /// Parse `usb://vvvv:pppp[/serial]`; the scheme prefix is optional.
    fn from_str(address: &str) -> Result<Self, TransportError> {
        let bad = || TransportError::InvalidTarget(address.to_string());

        let rest = address.strip_prefix("usb://").unwrap_or(address);
        let (ids, serial) = match rest.find('/') {
            Some(pos) => (&rest[..pos], Some(rest[pos + 1..].to_string())),
            None => (rest, None),
        };
        if serial.as_deref() == Some("") {
            return Err(bad());
        }

        let mut parts = ids.splitn(2, ':');
        let vendor = parts.next().ok_or_else(bad)?;
        let product = parts.next().ok_or_else(bad)?;
        let vendor_id = u16::from_str_radix(vendor, 16).map_err(|_| bad())?;
        let product_id = u16::from_str_radix(product, 16).map_err(|_| bad())?;

        Ok(DeviceTarget {
            vendor_id,
            product_id,
            serial,
        })
    }
}

/// Printer protocol boundary: build a device job, then deliver it.
///
/// `encode` must fully complete before `send` begins; the device needs a
/// complete well-formed frame. `send` blocks until the device accepted
/// the job or reported failure.
pub trait RasterTransport {
    fn encode(&self, label: &NormalizedLabel) -> Result<RasterJob, EncodingError>;
    fn send(&mut self, job: RasterJob) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    address: u8,
}

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(1);
const STATUS_ATTEMPTS: u32 = 10;
const COMPLETION_ATTEMPTS: u32 = 30;

/// Blocking USB transport for one QL printer.
pub struct UsbPrinter {
    handle: DeviceHandle<Context>,
    endpoint_out: Endpoint,
    endpoint_in: Endpoint,
    media: Media,
    rotation: Rotation,
    options: RasterOptions,
}

impl UsbPrinter {
    /// Open and claim the addressed device.
    pub fn open(
        target: &DeviceTarget,
        media: Media,
        rotation: Rotation,
        options: RasterOptions,
    ) -> Result<Self, TransportError> {
        let context = Context::new()?;
        let (mut device, device_desc, mut handle) = Self::open_device(&context, target)?;
        handle.reset()?;

        let endpoint_in =
            Self::find_endpoint(&mut device, &device_desc, Direction::In, TransferType::Bulk)
                .ok_or(TransportError::MissingEndpoint)?;
        let endpoint_out =
            Self::find_endpoint(&mut device, &device_desc, Direction::Out, TransferType::Bulk)
                .ok_or(TransportError::MissingEndpoint)?;

        // Some models hold a kernel driver on interface 0; it must be
        // detached before the claim or the claim fails.
        handle.set_auto_detach_kernel_driver(true)?;
        let has_kernel_driver = matches!(handle.kernel_driver_active(0), Ok(true));
        info!("kernel driver support is {}", has_kernel_driver);

        handle.set_active_configuration(1)?;
        handle.claim_interface(0)?;
        handle.set_alternate_setting(0, 0)?;

        Ok(UsbPrinter {
            handle,
            endpoint_out,
            endpoint_in,
            media,
            rotation,
            options,
        })
    }

    fn open_device(
        context: &Context,
        target: &DeviceTarget,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), TransportError> {
        let devices = context.devices()?;
        if devices.is_empty() {
            debug!("failed to read device list");
            return Err(TransportError::DeviceListNotReadable);
        }

        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != target.vendor_id
                || device_desc.product_id() != target.product_id
            {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("failed to open device: {:?}", err);
                    continue;
                }
            };

            match &target.serial {
                None => return Ok((device, device_desc, handle)),
                Some(serial) => {
                    let languages = handle.read_languages(STATUS_TIMEOUT)?;
                    if languages.is_empty() {
                        continue;
                    }
                    match handle.read_serial_number_string(
                        languages[0],
                        &device_desc,
                        STATUS_TIMEOUT,
                    ) {
                        Ok(s) if s == *serial => return Ok((device, device_desc, handle)),
                        Ok(_) => continue,
                        Err(err) => {
                            debug!("failed to read serial number string: {:?}", err);
                            continue;
                        }
                    }
                }
            }
        }

        debug!("no device match for target {:?}", target);
        Err(TransportError::DeviceOffline)
    }

    fn find_endpoint(
        device: &mut Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
        transfer_type: TransferType,
    ) -> Option<Endpoint> {
        for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for interface in config_desc.interfaces() {
                for interface_desc in interface.descriptors() {
                    for endpoint_desc in interface_desc.endpoint_descriptors() {
                        if endpoint_desc.direction() == direction
                            && endpoint_desc.transfer_type() == transfer_type
                        {
                            return Some(Endpoint {
                                address: endpoint_desc.address(),
                            });
                        }
                    }
                }
            }
        }
        None
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        let n = self
            .handle
            .write_bulk(self.endpoint_out.address, buf, WRITE_TIMEOUT)?;
        if n == buf.len() {
            Ok(n)
        } else {
            debug!("short write: {} of {} bytes", n, buf.len());
            Err(TransportError::ShortWrite {
                written: n,
                expected: buf.len(),
            })
        }
    }

    fn invalidate_and_init() -> Vec<u8> {
        let mut buf = vec![0x00; 400];
        buf.extend_from_slice(&[0x1B, 0x40]);
        buf
    }

    fn request_status(&self) -> Result<(), TransportError> {
        let mut buf = Self::invalidate_and_init();
        buf.extend_from_slice(&[0x1B, 0x69, 0x53]);
        self.write(&buf)?;
        Ok(())
    }

    /// Poll until the printer reports it is ready to receive.
    fn read_status(&self) -> Result<Status, TransportError> {
        let mut buf: [u8; 32] = [0x00; 32];

        for _ in 0..STATUS_ATTEMPTS {
            match self
                .handle
                .read_bulk(self.endpoint_in.address, &mut buf, STATUS_TIMEOUT)
            {
                Ok(32) => {
                    let status = Status::from_buf(buf);
                    debug!("raw status: {:X?}", buf);
                    debug!("parsed status: {:?}", status);
                    if status.phase == Phase::Receiving {
                        return Ok(status);
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                Ok(_) => {
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => return Err(TransportError::Usb(e)),
            }
        }
        Err(TransportError::ReadStatusTimeout)
    }

    /// Block until the device acknowledges the printed job.
    fn wait_completion(&self) -> Result<(), TransportError> {
        let mut buf: [u8; 32] = [0x00; 32];

        for _ in 0..COMPLETION_ATTEMPTS {
            match self
                .handle
                .read_bulk(self.endpoint_in.address, &mut buf, STATUS_TIMEOUT)
            {
                Ok(32) => {
                    let status = Status::from_buf(buf);
                    debug!("completion status: {:?}", status);
                    if !status.error.is_no_error() {
                        return Err(TransportError::Printer(status.error));
                    }
                    if status.status_type == StatusType::Completed {
                        return Ok(());
                    }
                }
                Ok(_) => {
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(rusb::Error::Timeout) => {
                    // Printing can outlast a single read window.
                }
                Err(e) => return Err(TransportError::Usb(e)),
            }
        }
        Err(TransportError::PrintTimeout)
    }

    /// Query and decode the printer status without sending a job.
    ///
    /// Handy for checking which tape is installed before committing to a
    /// media profile.
    pub fn check_status(&self) -> Result<Status, TransportError> {
        self.request_status()?;
        self.read_status()
    }

    /// Verify the installed media against the configured profile.
    fn check_media(&self, status: &Status) -> Result<(), TransportError> {
        match status.installed_media() {
            Some(installed) if installed == self.media => Ok(()),
            installed => Err(TransportError::MediaMismatch {
                expected: self.media.code().to_string(),
                actual: installed.map(|m| m.code().to_string()),
            }),
        }
    }

    /// Abandon the current job by re-initializing the printer.
    pub fn cancel(&self) -> Result<(), TransportError> {
        self.write(&Self::invalidate_and_init())?;
        Ok(())
    }
}

impl RasterTransport for UsbPrinter {
    fn encode(&self, label: &NormalizedLabel) -> Result<RasterJob, EncodingError> {
        build_job(label, self.media, self.rotation, &self.options)
    }

    fn send(&mut self, job: RasterJob) -> Result<(), TransportError> {
        debug!("request status before send");
        let status = self.check_status()?;
        self.check_media(&status)?;

        debug!("writing {} byte raster frame", job.as_bytes().len());
        self.write(job.as_bytes())?;
        self.wait_completion()
    }
}

/// Status received from the printer, decoded to a Rust friendly type.
#[derive(Debug)]
pub struct Status {
    error: PrinterError,
    media: Option<Media>,
    status_type: StatusType,
    phase: Phase,
}

impl Status {
    fn from_buf(buf: [u8; 32]) -> Self {
        Status {
            error: PrinterError::from_buf(buf),
            media: Media::from_buf(buf),
            status_type: StatusType::from_code(buf[18]),
            phase: Phase::from_buf(buf),
        }
    }

    pub fn installed_media(&self) -> Option<Media> {
        self.media
    }
}

#[derive(Debug, PartialEq)]
enum StatusType {
    ReplyToRequest,
    Completed,
    Error,
    Offline,
    Notification,
    PhaseChange,
    Unknown,
}

impl StatusType {
    fn from_code(code: u8) -> StatusType {
        match code {
            0x00 => Self::ReplyToRequest,
            0x01 => Self::Completed,
            0x02 => Self::Error,
            0x04 => Self::Offline,
            0x05 => Self::Notification,
            0x06 => Self::PhaseChange,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Phase {
    Receiving,
    Printing,
    Waiting,
}

impl Phase {
    fn from_buf(buf: [u8; 32]) -> Self {
        match buf[19] {
            0x00 => Self::Receiving,
            0x01 => Self::Printing,
            _ => Self::Waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn target_parses_with_scheme() {
        let target: DeviceTarget = "usb://04f9:209b".parse().unwrap();
        assert_eq!(target.vendor_id, 0x04F9);
        assert_eq!(target.product_id, 0x209B);
        assert_eq!(target.serial, None);
    }

    #[test]
    fn target_parses_bare_ids_and_serial() {
        let target: DeviceTarget = "04f9:209d/000G2G844181".parse().unwrap();
        assert_eq!(target.vendor_id, 0x04F9);
        assert_eq!(target.product_id, 0x209D);
        assert_eq!(target.serial.as_deref(), Some("000G2G844181"));
    }

    #[test]
    fn malformed_targets_are_rejected() {
        for address in &["", "usb://", "04f9", "zz:209b", "04f9:209b/", "04f9:fffff"] {
            assert!(
                address.parse::<DeviceTarget>().is_err(),
                "accepted {:?}",
                address
            );
        }
    }

    #[test]
    fn status_decodes_phase_and_type() {
        let mut buf = [0u8; 32];
        buf[10] = 29;
        buf[11] = 0x0A;
        buf[18] = 0x01;
        buf[19] = 0x00;
        let status = Status::from_buf(buf);
        assert_eq!(status.phase, Phase::Receiving);
        assert_eq!(status.status_type, StatusType::Completed);
        assert_eq!(status.installed_media(), Some(Media::Continuous29));
        assert!(status.error.is_no_error());
    }
}
