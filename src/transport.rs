use std::thread;
use std::time::Duration;

use crate::grabber::GrabberError;

/// Inbound half of a grabber link.
pub trait ByteSource: Send {
    /// Reads whatever payload bytes are available into `buf`.
    ///
    /// `Ok(0)` means the read timed out without data; the caller polls again.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, GrabberError>;
}

/// Outbound half of a grabber link.
pub trait ByteSink: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), GrabberError>;
}

/// Opens grabber links, optionally selecting a device by its USB serial string.
pub trait Connector: Send + Sync {
    fn open(&self, serial: Option<&str>) -> Result<Link, GrabberError>;
}

/// Both halves of an opened link.
pub struct Link {
    pub source: Box<dyn ByteSource>,
    pub sink: Box<dyn ByteSink>,
}

impl Link {
    pub fn new<S, K>(source: S, sink: K) -> Self
    where
        S: ByteSource + 'static,
        K: ByteSink + 'static,
    {
        Link {
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }
}

/// `DelayNs` backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// `DelayNs` that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
