//! In-memory Tau core behind a grabber FIFO, for driving `ThermalGrabber`
//! without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::grabber::GrabberError;
use crate::stream::{teax_packet, uart_packet};
use crate::tau_frame::{build_frame, parse_frame};
use crate::transport::{ByteSink, ByteSource, Connector, Link};

const PART_NUMBER: &str = "46160009H-SPNLX^46160009H";
const SENSOR_WIDTH: usize = 160;
const SENSOR_HEIGHT: usize = 128;

struct CoreState {
    responsive: bool,
    digital: u8,
    xp: u8,
    cmos: u8,
    tlinear_enabled: u8,
    tlinear_mode: u8,
    received: Vec<(u8, Vec<u8>)>,
    outbox: VecDeque<u8>,
    streaming: Option<Duration>,
    opens: u32,
}

impl CoreState {
    fn respond(&mut self, function: u8, payload: &[u8]) -> Vec<u8> {
        match (function, payload) {
            (0x04, _) => {
                let mut out = FakeCore::CAMERA_SERIAL.to_be_bytes().to_vec();
                out.extend_from_slice(&FakeCore::SENSOR_SERIAL.to_be_bytes());
                out
            }
            (0x05, _) => vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04],
            (0x66, _) => {
                let mut out = PART_NUMBER.as_bytes().to_vec();
                out.resize(32, 0);
                out
            }
            (0x12, []) => vec![0x00, self.digital],
            (0x12, [0x00, value]) => {
                self.digital = *value;
                vec![0x00, *value]
            }
            (0x12, [0x02, _]) => vec![0x00, self.xp],
            (0x12, [0x03, value]) => {
                self.xp = *value;
                payload.to_vec()
            }
            (0x12, [0x08, _]) => vec![0x00, self.cmos],
            (0x12, [0x06, value]) => {
                self.cmos = *value;
                payload.to_vec()
            }
            (0x8E, [0x00, 0x40]) => vec![0x00, self.tlinear_enabled],
            (0x8E, [0x00, 0x40, 0x00, value]) => {
                self.tlinear_enabled = *value;
                payload.to_vec()
            }
            (0x8E, [0x00, 0x10]) => vec![0x00, self.tlinear_mode],
            (0x8E, [0x00, 0x10, 0x00, value]) => {
                self.tlinear_mode = *value;
                payload.to_vec()
            }
            (0x20, _) => vec![0x01, 0x2C],
            _ => payload.to_vec(),
        }
    }
}

/// Shared handle to one simulated 160x128 core; clones observe the same core.
#[derive(Clone)]
pub struct FakeCore {
    state: Arc<Mutex<CoreState>>,
}

impl FakeCore {
    pub const CAMERA_SERIAL: u32 = 12345;
    pub const SENSOR_SERIAL: u32 = 67890;
    pub const USB_SERIAL: &'static str = "TG000042";

    /// Responsive core with all digital outputs switched off.
    pub fn new() -> Self {
        FakeCore {
            state: Arc::new(Mutex::new(CoreState {
                responsive: true,
                digital: 0x02,
                xp: 0x00,
                cmos: 0x01,
                tlinear_enabled: 0,
                tlinear_mode: 0,
                received: Vec::new(),
                outbox: VecDeque::new(),
                streaming: None,
                opens: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap()
    }

    pub fn set_responsive(&self, responsive: bool) {
        self.state().responsive = responsive;
    }

    pub fn set_outputs(&self, digital: u8, xp: u8, cmos: u8) {
        let mut state = self.state();
        state.digital = digital;
        state.xp = xp;
        state.cmos = cmos;
    }

    /// Digital output, XP mode and CMOS bit depth registers.
    pub fn outputs(&self) -> (u8, u8, u8) {
        let state = self.state();
        (state.digital, state.xp, state.cmos)
    }

    /// Emits one video frame per `interval` while the outbox is idle.
    pub fn set_streaming(&self, interval: Option<Duration>) {
        self.state().streaming = interval;
    }

    pub fn commands(&self) -> Vec<(u8, Vec<u8>)> {
        self.state().received.clone()
    }

    pub fn clear_commands(&self) {
        self.state().received.clear();
    }

    pub fn opens(&self) -> u32 {
        self.state().opens
    }

    /// Pixel values carried by every streamed frame.
    pub fn frame_pixels(width: usize, height: usize) -> Vec<u16> {
        (0..width * height).map(|i| (i % 0x4000) as u16).collect()
    }

    fn video_words() -> Vec<u16> {
        let mut words = vec![0x0001, 0x8000];
        words.extend(
            Self::frame_pixels(SENSOR_WIDTH, SENSOR_HEIGHT)
                .into_iter()
                .map(|v| 0xC000 | v),
        );
        words
    }
}

impl Connector for FakeCore {
    fn open(&self, serial: Option<&str>) -> Result<Link, GrabberError> {
        if serial.is_some_and(|s| s != Self::USB_SERIAL) {
            return Err(GrabberError::NoDevice);
        }

        let mut state = self.state();
        state.opens += 1;
        state.outbox.clear();
        drop(state);

        Ok(Link::new(
            FakeSource {
                core: self.clone(),
                last_frame: None,
            },
            FakeSink { core: self.clone() },
        ))
    }
}

struct FakeSource {
    core: FakeCore,
    last_frame: Option<Instant>,
}

impl ByteSource for FakeSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, GrabberError> {
        let mut state = self.core.state();

        if state.outbox.is_empty() {
            if let Some(interval) = state.streaming {
                if self.last_frame.map_or(true, |t| t.elapsed() >= interval) {
                    state.outbox.extend(teax_packet(&FakeCore::video_words()));
                    self.last_frame = Some(Instant::now());
                }
            }
        }

        if state.outbox.is_empty() {
            drop(state);
            thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }

        let n = buf.len().min(state.outbox.len());
        for (dst, src) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

struct FakeSink {
    core: FakeCore,
}

impl ByteSink for FakeSink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), GrabberError> {
        let frame = match data {
            [b'U', b'A', b'R', b'T', len, rest @ ..] if rest.len() == *len as usize => rest,
            _ => return Err(GrabberError::Transport("Malformed UART packet")),
        };
        let command =
            parse_frame(frame).map_err(|_| GrabberError::Transport("Malformed command frame"))?;

        let mut state = self.core.state();
        state
            .received
            .push((command.function, command.payload.to_vec()));
        if !state.responsive {
            return Ok(());
        }

        let reply = state.respond(command.function, command.payload);
        let packet = build_frame(command.function, &reply)
            .and_then(|frame| uart_packet(&frame))
            .map_err(|_| GrabberError::Transport("Reply does not fit"))?;
        state.outbox.extend(packet);
        Ok(())
    }
}
