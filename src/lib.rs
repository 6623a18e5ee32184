//! Driver for the ThermalCapture GrabberUSB and the FLIR Tau 2 core behind it.
//!
//! The grabber multiplexes the core's video (`TEAX`) and serial command
//! channel (`UART`) over one FT232H FIFO. [`ThermalGrabber`] owns the link,
//! brings the core into 14-bit CMOS output and hands decoded frames to a
//! [`FrameHandler`].

pub mod config;
pub mod crc;
pub mod decoder;
pub mod device;
pub mod ftdi;
pub mod grabber;
pub mod stream;
pub mod tau_command;
pub mod tau_frame;
pub mod tau_status;
pub mod transport;
pub mod watchdog;

#[cfg(test)]
mod testing;

pub use config::GrabberConfig;
pub use decoder::{decode_frame, RawThermalFrame};
pub use device::{ConnectionState, DeviceState, Resolution, Revision};
pub use ftdi::{FtdiConfig, FtdiConnector};
pub use grabber::{FrameHandler, GrabberError, LinkDiagnostics, ThermalGrabber};
pub use tau_command::{GainMode, TLinearResolution, TauCommand, TriggerMode};
pub use tau_status::TauStatus;
