//! Connects to the first ThermalCapture GrabberUSB (or the one whose USB
//! serial is given as first argument) and writes a few frames as PGM files.
//!
//! `RUST_LOG=debug cargo run --example snap -- TG000042`

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::mpsc;
use std::time::Duration;

use log::{info, warn};
use thermalgrabber_rs::ftdi::list_devices;
use thermalgrabber_rs::{FtdiConfig, GrabberConfig, RawThermalFrame, ThermalGrabber};

const FRAMES: usize = 3;

fn write_pgm(path: &str, frame: &RawThermalFrame) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P5\n{} {}\n255\n", frame.width, frame.height)?;
    out.write_all(&frame.to_gray8())?;
    out.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let usb = FtdiConfig::default();
    for device in list_devices(&usb)? {
        info!(
            "Found {:04x}:{:04x} on bus {} address {}, serial {:?}",
            device.vendor_id, device.product_id, device.bus, device.address, device.serial
        );
    }

    let (tx, rx) = mpsc::sync_channel(FRAMES);
    let handler = move |frame: &RawThermalFrame| {
        let _ = tx.try_send(frame.clone());
    };
    let grabber = ThermalGrabber::ftdi(GrabberConfig::default(), usb, handler);

    let serial = std::env::args().nth(1);
    grabber.connect(serial.as_deref())?;
    info!(
        "Connected to {} ({}x{}), camera serial {}, sensor serial {}",
        grabber.camera_part_number(),
        grabber.width(),
        grabber.height(),
        grabber.camera_serial_number(),
        grabber.sensor_serial_number()
    );

    for index in 0..FRAMES {
        let frame = match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("No frame received: {}", err);
                break;
            }
        };
        let path = format!("frame_{}.pgm", index);
        write_pgm(&path, &frame)?;
        info!(
            "Wrote {} (raw range {}..{}, pps {:?})",
            path, frame.min, frame.max, frame.pps_timestamp
        );
    }

    info!("{:?}", grabber.diagnostics());
    grabber.disconnect();
    Ok(())
}
