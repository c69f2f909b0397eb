use log::{debug, info, warn};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::Duration;

use crate::{
    encoder::CommandFrame,
    error::Error,
    model::Model,
    status::{StatusTrace, STATUS_LEN},
};

/// Brother Industries USB vendor id.
pub const VENDOR_ID: u16 = 0x04F9;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const READ_TRIES: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(500);

/// USB interface class of printers.
const PRINTER_CLASS: u8 = 0x07;

/// Raw byte exchange with a printer.
pub trait Transport {
    /// Write the whole buffer to the device.
    fn send(&self, data: &[u8]) -> Result<(), Error>;

    /// Read up to `max_len` bytes, or `None` if the device stayed silent.
    fn receive(&self, max_len: usize) -> Result<Option<Vec<u8>>, Error>;
}

/// Send a print job and decode the status report that follows it.
///
/// Returns `None` if the printer sends nothing back.
pub fn submit<T: Transport + ?Sized>(
    transport: &T,
    frame: &CommandFrame,
) -> Result<Option<StatusTrace>, Error> {
    info!("sending {} bytes", frame.len());
    transport.send(frame.as_bytes())?;

    match transport.receive(STATUS_LEN)? {
        Some(data) => StatusTrace::decode(Some(&data[..])).map(Some),
        None => {
            info!("nothing received");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    config: u8,
    iface: u8,
    setting: u8,
    address: u8,
}

/// Bulk USB connection to one printer.
pub struct UsbTransport {
    handle: Box<DeviceHandle<Context>>,
    endpoint_out: Endpoint,
    endpoint_in: Endpoint,
}

impl UsbTransport {
    /// Open the first `model` on the bus, or the one whose serial matches.
    pub fn open(model: Model, serial: Option<&str>) -> Result<Self, Error> {
        let mut context = Context::new()?;
        let (mut device, device_desc, mut handle) =
            match Self::open_device(&mut context, VENDOR_ID, model.pid(), serial) {
                Ok(found) => found,
                Err(err) => {
                    debug!("{:?}", err);
                    return Err(Error::DeviceOffline);
                }
            };

        handle.reset()?;

        let endpoint_in = Self::find_endpoint(
            &mut device,
            &device_desc,
            Direction::In,
            TransferType::Bulk,
        )
        .ok_or(Error::MissingEndpoint)?;

        let endpoint_out = Self::find_endpoint(
            &mut device,
            &device_desc,
            Direction::Out,
            TransferType::Bulk,
        )
        .ok_or(Error::MissingEndpoint)?;

        // The printer class interface is bound to usblp on most kernels
        handle.set_auto_detach_kernel_driver(true)?;
        let has_kernel_driver = matches!(handle.kernel_driver_active(endpoint_out.iface), Ok(true));
        info!("Kernel driver support is {}", has_kernel_driver);
        handle.set_active_configuration(endpoint_out.config)?;
        handle.claim_interface(endpoint_out.iface)?;
        handle.set_alternate_setting(endpoint_out.iface, endpoint_out.setting)?;

        debug!("endpoints in {:?} out {:?}", endpoint_in, endpoint_out);

        Ok(UsbTransport {
            handle: Box::new(handle),
            endpoint_out,
            endpoint_in,
        })
    }

    fn open_device(
        context: &mut Context,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<(Device<Context>, DeviceDescriptor, DeviceHandle<Context>), Error> {
        let devices = context.devices()?;

        if devices.is_empty() {
            debug!("Failed to read device list");
            return Err(Error::DeviceListNotReadable);
        }
        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != vid || device_desc.product_id() != pid {
                continue;
            }
            debug!("{:?}", device_desc);

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    debug!("Failed to open device: {:?}", err);
                    continue;
                }
            };

            let wanted = match serial {
                Some(wanted) => wanted,
                None => return Ok((device, device_desc, handle)),
            };

            let languages = handle.read_languages(READ_TIMEOUT)?;
            let language = match languages.first() {
                Some(language) => *language,
                None => continue,
            };
            match handle.read_serial_number_string(language, &device_desc, READ_TIMEOUT) {
                Ok(s) if s == wanted => return Ok((device, device_desc, handle)),
                Ok(_) => continue,
                Err(err) => {
                    debug!("Failed to read serial number string: {:?}", err);
                    continue;
                }
            }
        }
        debug!("No device match with this serial: {:?}", serial);
        Err(Error::DeviceOffline)
    }

    /// First bulk endpoint in `direction`, taken from a printer class
    /// interface when the device exposes one.
    fn find_endpoint(
        device: &mut Device<Context>,
        device_desc: &DeviceDescriptor,
        direction: Direction,
        transfer_type: TransferType,
    ) -> Option<Endpoint> {
        let mut candidates = Vec::new();

        for config_desc in (0..device_desc.num_configurations())
            .filter_map(|n| device.config_descriptor(n).ok())
        {
            for interface_desc in config_desc.interfaces().flat_map(|i| i.descriptors()) {
                candidates.extend(
                    interface_desc
                        .endpoint_descriptors()
                        .filter(|e| e.direction() == direction && e.transfer_type() == transfer_type)
                        .map(|e| {
                            let endpoint = Endpoint {
                                config: config_desc.number(),
                                iface: interface_desc.interface_number(),
                                setting: interface_desc.setting_number(),
                                address: e.address(),
                            };
                            (interface_desc.class_code(), endpoint)
                        }),
                );
            }
        }

        pick_endpoint(&candidates)
    }
}

fn pick_endpoint(candidates: &[(u8, Endpoint)]) -> Option<Endpoint> {
    candidates
        .iter()
        .find(|(class, _)| *class == PRINTER_CLASS)
        .or_else(|| candidates.first())
        .map(|(_, endpoint)| *endpoint)
}

impl Transport for UsbTransport {
    fn send(&self, data: &[u8]) -> Result<(), Error> {
        let n = self
            .handle
            .write_bulk(self.endpoint_out.address, data, WRITE_TIMEOUT)?;
        if n == data.len() {
            Ok(())
        } else {
            debug!(
                "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                n,
                data.len()
            );
            Err(Error::InvalidResponse(n))
        }
    }

    fn receive(&self, max_len: usize) -> Result<Option<Vec<u8>>, Error> {
        let mut buf = vec![0u8; max_len];

        for attempt in 1..=READ_TRIES {
            debug!("reading data (attempt {}/{})", attempt, READ_TRIES);
            match self
                .handle
                .read_bulk(self.endpoint_in.address, &mut buf, READ_TIMEOUT)
            {
                Ok(0) | Err(rusb::Error::Timeout) => std::thread::sleep(READ_BACKOFF),
                Ok(n) => {
                    buf.truncate(n);
                    debug!("Raw status code: {:X?}", buf);
                    return Ok(Some(buf));
                }
                Err(e) => return Err(Error::UsbError(e)),
            }
        }
        warn!("no data after {} attempts", READ_TRIES);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{convert::PreparedImage, label::LabelSpec};
    use std::cell::RefCell;

    struct Loopback {
        sent: RefCell<Vec<u8>>,
        reply: Option<Vec<u8>>,
    }

    impl Loopback {
        fn new(reply: Option<Vec<u8>>) -> Self {
            Loopback {
                sent: RefCell::new(Vec::new()),
                reply,
            }
        }
    }

    impl Transport for Loopback {
        fn send(&self, data: &[u8]) -> Result<(), Error> {
            self.sent.borrow_mut().extend_from_slice(data);
            Ok(())
        }

        fn receive(&self, max_len: usize) -> Result<Option<Vec<u8>>, Error> {
            assert_eq!(max_len, STATUS_LEN);
            Ok(self.reply.clone())
        }
    }

    fn frame() -> CommandFrame {
        let image = PreparedImage::new(720, 1, vec![0xFF; 90]);
        CommandFrame::encode(&image, LabelSpec::lookup("62").unwrap()).unwrap()
    }

    fn reply() -> Vec<u8> {
        let mut buf = vec![0u8; STATUS_LEN];
        buf[..3].copy_from_slice(&[0x80, 0x20, 0x42]);
        buf[5] = 0x30;
        buf[11] = 0x0A;
        buf
    }

    #[test]
    fn submit_sends_frame_and_decodes_reply() {
        let transport = Loopback::new(Some(reply()));
        let frame = frame();
        let trace = submit(&transport, &frame).unwrap().unwrap();

        assert!(trace.is_valid());
        assert_eq!(&transport.sent.borrow()[..], frame.as_bytes());
    }

    #[test]
    fn submit_without_reply() {
        let transport = Loopback::new(None);
        assert!(submit(&transport, &frame()).unwrap().is_none());
    }

    #[test]
    fn submit_rejects_short_reply() {
        let transport = Loopback::new(Some(vec![0x80; 12]));
        assert!(matches!(
            submit(&transport, &frame()),
            Err(Error::StatusFormat(Some(12)))
        ));
    }

    #[test]
    fn printer_class_interface_is_preferred() {
        let endpoint = |iface, address| Endpoint {
            config: 1,
            iface,
            setting: 0,
            address,
        };
        let vendor = endpoint(0, 0x81);
        let printer = endpoint(1, 0x82);

        assert_eq!(
            pick_endpoint(&[(0xFF, vendor), (PRINTER_CLASS, printer)]),
            Some(printer)
        );
        assert_eq!(pick_endpoint(&[(0xFF, vendor)]), Some(vendor));
        assert_eq!(pick_endpoint(&[]), None);
    }

    #[test]
    fn submit_through_trait_object() {
        let transport: Box<dyn Transport> = Box::new(Loopback::new(Some(reply())));
        assert!(submit(transport.as_ref(), &frame()).unwrap().is_some());
    }
}
