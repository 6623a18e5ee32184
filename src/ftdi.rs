//! FT232H synchronous-FIFO link to the ThermalCapture GrabberUSB.
//!
//! Every bulk IN packet of the FTDI chip starts with two modem status bytes
//! which are stripped here, so the stream handed upwards is the raw FIFO data.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use pretty_hex::PrettyHex;
use rusb::{
    request_type, Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext,
};

use crate::grabber::GrabberError;
use crate::transport::{ByteSink, ByteSource, Connector, Link};

pub const FTDI_VENDOR_ID: u16 = 0x0403;
pub const FT232H_PRODUCT_ID: u16 = 0x6014;

const SIO_SET_LATENCY_TIMER: u8 = 0x09;
const SIO_SET_BITMODE: u8 = 0x0B;
const BITMODE_SYNC_FIFO: u16 = 0x40;
const ALL_PINS_OUTPUT: u16 = 0xFF;

#[derive(Debug, Clone)]
pub struct FtdiConfig {
    pub vendor_id: u16,
    /// `None` accepts any product id of the vendor.
    pub product_id: Option<u16>,
    pub configuration: u8,
    pub interface: u8,
    /// wIndex of FTDI vendor requests, interface A is 1.
    pub port_index: u16,
    pub endpoint_in: u8,
    pub endpoint_out: u8,
    pub packet_size: usize,
    pub status_bytes: usize,
    pub packets_per_read: usize,
    pub latency_timer_ms: u8,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub control_timeout: Duration,
}

impl Default for FtdiConfig {
    fn default() -> Self {
        Self {
            vendor_id: FTDI_VENDOR_ID,
            product_id: None,
            configuration: 1,
            interface: 0,
            port_index: 1,
            endpoint_in: 0x81,
            endpoint_out: 0x02,
            packet_size: 512,
            status_bytes: 2,
            packets_per_read: 256,
            latency_timer_ms: 2,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(1000),
            control_timeout: Duration::from_millis(1000),
        }
    }
}

impl FtdiConfig {
    /// Payload bytes carried by one full bulk packet.
    pub fn payload_per_packet(&self) -> usize {
        self.packet_size.saturating_sub(self.status_bytes)
    }

    /// Payload bytes delivered by one full bulk read.
    pub fn payload_per_read(&self) -> usize {
        self.payload_per_packet() * self.packets_per_read
    }

    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == self.vendor_id && self.product_id.map_or(true, |pid| pid == product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtdiDeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
}

/// Lists all attached devices matching the configured vendor/product.
pub fn list_devices(config: &FtdiConfig) -> Result<Vec<FtdiDeviceInfo>, GrabberError> {
    let context = Context::new()?;
    let mut found = Vec::new();

    for device in context.devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(err) => {
                warn!("Failed to read device descriptor: {}", err);
                continue;
            }
        };
        if !config.matches(desc.vendor_id(), desc.product_id()) {
            continue;
        }

        found.push(FtdiDeviceInfo {
            bus: device.bus_number(),
            address: device.address(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            serial: read_serial(&device),
        });
    }

    Ok(found)
}

fn read_serial<T: UsbContext>(device: &Device<T>) -> Option<String> {
    let desc = device.device_descriptor().ok()?;
    desc.serial_number_string_index()?;
    let handle = device.open().ok()?;
    handle.read_serial_number_string_ascii(&desc).ok()
}

/// Claimed device, released when both link halves are gone.
struct FtdiHandle {
    handle: DeviceHandle<Context>,
    interface: u8,
}

impl Drop for FtdiHandle {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.interface) {
            debug!("Releasing FTDI interface failed: {}", err);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FtdiConnector {
    config: FtdiConfig,
}

impl FtdiConnector {
    pub fn new(config: FtdiConfig) -> Self {
        FtdiConnector { config }
    }

    pub fn config(&self) -> &FtdiConfig {
        &self.config
    }

    fn init(&self, handle: &mut DeviceHandle<Context>) -> rusb::Result<()> {
        let cfg = &self.config;
        if let Ok(true) = handle.kernel_driver_active(cfg.interface) {
            handle.detach_kernel_driver(cfg.interface)?;
        }
        handle.set_active_configuration(cfg.configuration)?;
        handle.claim_interface(cfg.interface)?;

        let out = request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        handle.write_control(
            out,
            SIO_SET_LATENCY_TIMER,
            cfg.latency_timer_ms as u16,
            cfg.port_index,
            &[],
            cfg.control_timeout,
        )?;
        handle.write_control(
            out,
            SIO_SET_BITMODE,
            ALL_PINS_OUTPUT | (BITMODE_SYNC_FIFO << 8),
            cfg.port_index,
            &[],
            cfg.control_timeout,
        )?;
        Ok(())
    }
}

impl Connector for FtdiConnector {
    fn open(&self, serial: Option<&str>) -> Result<Link, GrabberError> {
        let context = Context::new()?;

        for device in context.devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if !self.config.matches(desc.vendor_id(), desc.product_id()) {
                continue;
            }

            let found_serial = read_serial(&device);
            debug!(
                "FTDI device {:04x}:{:04x} iSerial {:?}",
                desc.vendor_id(),
                desc.product_id(),
                found_serial
            );

            if let Some(wanted) = serial.filter(|s| !s.is_empty()) {
                if found_serial.as_deref() != Some(wanted) {
                    debug!("Skipping device, iSerial {:?} != {}", found_serial, wanted);
                    continue;
                }
            }

            let mut handle = match device.open() {
                Ok(handle) => handle,
                Err(err) => {
                    warn!("Opening FTDI device failed: {}", err);
                    continue;
                }
            };
            self.init(&mut handle)?;
            info!(
                "Opened ThermalCapture GrabberUSB on bus {} address {} (iSerial {:?})",
                device.bus_number(),
                device.address(),
                found_serial
            );

            let shared = Arc::new(FtdiHandle {
                handle,
                interface: self.config.interface,
            });
            let source = FtdiSource {
                handle: shared.clone(),
                config: self.config.clone(),
                raw: vec![0; self.config.packet_size * self.config.packets_per_read],
            };
            let sink = FtdiSink {
                handle: shared,
                config: self.config.clone(),
            };
            return Ok(Link::new(source, sink));
        }

        Err(GrabberError::NoDevice)
    }
}

pub struct FtdiSource {
    handle: Arc<FtdiHandle>,
    config: FtdiConfig,
    raw: Vec<u8>,
}

impl ByteSource for FtdiSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, GrabberError> {
        let per_packet = self.config.payload_per_packet();
        if per_packet == 0 {
            return Err(GrabberError::Transport("FTDI packet size leaves no payload"));
        }
        let packets = (buf.len() / per_packet).min(self.raw.len() / self.config.packet_size);
        if packets == 0 {
            return Err(GrabberError::Transport("Read buffer smaller than one FTDI packet"));
        }

        let raw = &mut self.raw[..packets * self.config.packet_size];
        let received = match self
            .handle
            .handle
            .read_bulk(self.config.endpoint_in, raw, self.config.read_timeout)
        {
            Ok(n) => n,
            Err(rusb::Error::Timeout) => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut written = 0;
        for packet in raw[..received].chunks(self.config.packet_size) {
            if packet.len() <= self.config.status_bytes {
                continue;
            }
            let payload = &packet[self.config.status_bytes..];
            buf[written..written + payload.len()].copy_from_slice(payload);
            written += payload.len();
        }

        if written > 0 {
            trace!("FTDI IN {} bytes\n{:?}", written, buf[..written.min(64)].hex_dump());
        }
        Ok(written)
    }
}

pub struct FtdiSink {
    handle: Arc<FtdiHandle>,
    config: FtdiConfig,
}

impl ByteSink for FtdiSink {
    fn write_all(&mut self, mut data: &[u8]) -> Result<(), GrabberError> {
        trace!("FTDI OUT {} bytes\n{:?}", data.len(), data.hex_dump());
        while !data.is_empty() {
            let n = self
                .handle
                .handle
                .write_bulk(self.config.endpoint_out, data, self.config.write_timeout)?;
            if n == 0 {
                return Err(GrabberError::Transport("FTDI accepted no bytes"));
            }
            data = &data[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_interface_a() {
        let cfg = FtdiConfig::default();
        assert_eq!(cfg.vendor_id, 0x0403);
        assert_eq!(cfg.endpoint_in, 0x81);
        assert_eq!(cfg.endpoint_out, 0x02);
        assert_eq!(cfg.port_index, 1);
        assert_eq!(cfg.payload_per_packet(), 510);
        assert_eq!(cfg.payload_per_read(), 510 * 256);
    }

    #[test]
    fn product_filter() {
        let mut cfg = FtdiConfig::default();
        assert!(cfg.matches(0x0403, 0x6010));
        assert!(!cfg.matches(0x0547, 0x6014));

        cfg.product_id = Some(FT232H_PRODUCT_ID);
        assert!(cfg.matches(0x0403, 0x6014));
        assert!(!cfg.matches(0x0403, 0x6010));
    }

    #[test]
    fn sync_fifo_bitmode_value() {
        assert_eq!(ALL_PINS_OUTPUT | (BITMODE_SYNC_FIFO << 8), 0x40FF);
    }
}
