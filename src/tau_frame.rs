use core::fmt;

use log::{debug, warn};

use crate::crc::tau_crc16;
use crate::tau_status::TauStatus;

/// Process code opening every command and response frame.
pub const FRAME_START: u8 = 0x6E;
/// Header (8 bytes) plus trailing payload CRC (2 bytes).
pub const FRAME_OVERHEAD: usize = 10;
/// Scratch capacity of the incremental parser.
pub const PARSER_CAPACITY: usize = 512;

const HEADER_CRC_SPAN: usize = 6;
const PAYLOAD_OFFSET: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort { len: usize },
    Truncated { expected: usize, found: usize },
    HeaderCrc { expected: u16, found: u16 },
    DeviceStatus(TauStatus),
    PayloadCrc { expected: u16, found: u16 },
    PayloadTooLarge { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort { len } => write!(f, "Frame too short ({} bytes)", len),
            FrameError::Truncated { expected, found } => {
                write!(f, "Frame truncated ({} of {} bytes)", found, expected)
            }
            FrameError::HeaderCrc { expected, found } => write!(
                f,
                "Header CRC error (expected 0x{:04X}, found 0x{:04X})",
                expected, found
            ),
            FrameError::DeviceStatus(status) => {
                write!(f, "Device reported error: {} {}", status, status.label())
            }
            FrameError::PayloadCrc { expected, found } => write!(
                f,
                "Payload CRC error (expected 0x{:04X}, found 0x{:04X})",
                expected, found
            ),
            FrameError::PayloadTooLarge { len } => {
                write!(f, "Payload of {} bytes does not fit a frame", len)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A validated frame borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TauFrame<'a> {
    pub status: TauStatus,
    pub function: u8,
    pub payload: &'a [u8],
}

impl TauFrame<'_> {
    pub fn payload_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.payload.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn payload_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.payload.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Writes a frame without checking the payload length.
pub(crate) fn encode_frame(function: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.extend_from_slice(&[FRAME_START, 0x00, 0x00, function]);
    frame.extend_from_slice(&len.to_be_bytes());

    let header_crc = tau_crc16(&frame[..HEADER_CRC_SPAN]);
    frame.extend_from_slice(&header_crc.to_be_bytes());
    frame.extend_from_slice(payload);

    let frame_crc = tau_crc16(&frame);
    frame.extend_from_slice(&frame_crc.to_be_bytes());
    frame
}

/// Builds a command frame for `function` carrying `payload`.
pub fn build_frame(function: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge { len: payload.len() });
    }
    Ok(encode_frame(function, payload))
}

pub fn build_frame_no_value(function: u8) -> Vec<u8> {
    encode_frame(function, &[])
}

pub fn build_frame_u16(function: u8, value: u16) -> Vec<u8> {
    encode_frame(function, &value.to_be_bytes())
}

pub fn build_frame_u32(function: u8, value: u32) -> Vec<u8> {
    encode_frame(function, &value.to_be_bytes())
}

/// Expected total length of a frame once the header length field is known.
pub fn frame_len(header: &[u8]) -> Option<usize> {
    let len = header.get(4..6)?;
    Some(FRAME_OVERHEAD + u16::from_be_bytes([len[0], len[1]]) as usize)
}

/// Checks both CRCs and the status byte of a complete frame.
pub fn validate_frame(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < PAYLOAD_OFFSET {
        return Err(FrameError::TooShort { len: frame.len() });
    }

    let expected = tau_crc16(&frame[..HEADER_CRC_SPAN]);
    let found = u16::from_be_bytes([frame[6], frame[7]]);
    if expected != found {
        return Err(FrameError::HeaderCrc { expected, found });
    }

    if frame[1] != 0 {
        return Err(FrameError::DeviceStatus(TauStatus::from(frame[1])));
    }

    let total = frame_len(frame).unwrap_or(FRAME_OVERHEAD);
    if frame.len() < total {
        return Err(FrameError::Truncated {
            expected: total,
            found: frame.len(),
        });
    }

    let payload_end = total - 2;
    let expected = tau_crc16(&frame[PAYLOAD_OFFSET..payload_end]);
    let found = u16::from_be_bytes([frame[payload_end], frame[payload_end + 1]]);
    if expected != found {
        return Err(FrameError::PayloadCrc { expected, found });
    }

    Ok(())
}

pub fn is_valid_frame(frame: &[u8]) -> bool {
    validate_frame(frame).is_ok()
}

/// Validates a frame and splits out its function byte and payload.
pub fn parse_frame(frame: &[u8]) -> Result<TauFrame<'_>, FrameError> {
    validate_frame(frame)?;
    let total = frame_len(frame).unwrap_or(FRAME_OVERHEAD);
    Ok(TauFrame {
        status: TauStatus::from(frame[1]),
        function: frame[3],
        payload: &frame[PAYLOAD_OFFSET..total - 2],
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserDiagnostics {
    pub frames: u32,
    pub header_crc_errors: u32,
    pub payload_crc_errors: u32,
    pub device_errors: u32,
    pub overflow_resets: u32,
}

/// Reassembles command frames from an arbitrarily chunked byte stream.
#[derive(Debug)]
pub struct FrameParser {
    buffer: Vec<u8>,
    expected_len: usize,
    diagnostics: ParserDiagnostics,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser {
            buffer: Vec::with_capacity(PARSER_CAPACITY),
            expected_len: 0,
            diagnostics: ParserDiagnostics::default(),
        }
    }

    pub fn diagnostics(&self) -> ParserDiagnostics {
        self.diagnostics
    }

    /// Number of bytes of the frame currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_len = 0;
    }

    /// Feeds received bytes; `on_frame` is called with every complete frame
    /// whose CRCs and status byte validate.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(&[u8]),
    {
        for &byte in bytes {
            if self.buffer.len() == PARSER_CAPACITY {
                self.diagnostics.overflow_resets += 1;
                self.reset();
            }

            if self.buffer.is_empty() && byte != FRAME_START {
                continue;
            }
            self.buffer.push(byte);

            let index = self.buffer.len();
            if index == 7 {
                self.expected_len = frame_len(&self.buffer).unwrap_or(FRAME_OVERHEAD);
            } else if index > 7 && index == self.expected_len {
                match validate_frame(&self.buffer) {
                    Ok(()) => {
                        self.diagnostics.frames += 1;
                        on_frame(&self.buffer);
                    }
                    Err(err) => {
                        match err {
                            FrameError::HeaderCrc { .. } => self.diagnostics.header_crc_errors += 1,
                            FrameError::PayloadCrc { .. } => {
                                self.diagnostics.payload_crc_errors += 1
                            }
                            FrameError::DeviceStatus(_) => self.diagnostics.device_errors += 1,
                            _ => {}
                        }
                        warn!("Dropping Tau frame: {}", err);
                    }
                }
                self.reset();
            }
        }

        if !self.buffer.is_empty() {
            debug!(
                "Tau frame split across transfers ({} of {} bytes)",
                self.buffer.len(),
                self.expected_len
            );
        }
    }
}
