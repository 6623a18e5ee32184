use log::{debug, trace};

use crate::tau_frame::FrameError;

const TEAX_MARKER: &[u8; 4] = b"TEAX";
const UART_MARKER: &[u8; 4] = b"UART";

/// Smallest video payload accepted, in 16-bit words (160x128 core).
pub const MIN_FRAME_WORDS: u32 = 20480;
/// Largest video payload accepted, in 16-bit words (640x512 core plus line markers).
pub const MAX_FRAME_WORDS: u32 = 384000;

/// Transmit buffer size of the grabber's virtual UART.
pub const UART_TX_CAPACITY: usize = 128;
pub const UART_HEADER_BYTES: usize = 5;
pub const MAX_UART_PAYLOAD: usize = UART_TX_CAPACITY - UART_HEADER_BYTES;

/// Receiver of the two logical channels carried by the grabber FIFO.
pub trait StreamSink {
    /// One complete `TEAX` payload, words already assembled low byte first.
    fn video_payload(&mut self, words: &[u16]);
    /// One complete `UART` payload.
    fn uart_payload(&mut self, bytes: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    Idle,
    MatchTeax(usize),
    MatchUart(usize),
    ReadLength(usize),
    ReadVideo,
    ReadUartLength,
    ReadUart,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDiagnostics {
    pub bytes: u64,
    pub video_payloads: u32,
    pub uart_payloads: u32,
    pub marker_mismatches: u32,
    pub rejected_lengths: u32,
}

/// Splits the grabber byte stream into video and command channel payloads.
///
/// State persists between calls to [`StreamDemux::feed`], so transfers may be
/// cut at any byte.
#[derive(Debug)]
pub struct StreamDemux {
    state: DemuxState,
    frame_words: u32,
    video: Vec<u16>,
    low_byte: Option<u8>,
    uart_len: usize,
    uart: Vec<u8>,
    diagnostics: StreamDiagnostics,
}

impl Default for StreamDemux {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDemux {
    pub fn new() -> Self {
        StreamDemux {
            state: DemuxState::Idle,
            frame_words: 0,
            video: Vec::new(),
            low_byte: None,
            uart_len: 0,
            uart: Vec::with_capacity(u8::MAX as usize),
            diagnostics: StreamDiagnostics::default(),
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    pub fn diagnostics(&self) -> StreamDiagnostics {
        self.diagnostics
    }

    pub fn reset(&mut self) {
        self.state = DemuxState::Idle;
        self.frame_words = 0;
        self.video.clear();
        self.low_byte = None;
        self.uart_len = 0;
        self.uart.clear();
    }

    pub fn feed<S>(&mut self, bytes: &[u8], sink: &mut S)
    where
        S: StreamSink + ?Sized,
    {
        self.diagnostics.bytes += bytes.len() as u64;
        for &byte in bytes {
            self.step(byte, sink);
        }
    }

    fn step<S>(&mut self, byte: u8, sink: &mut S)
    where
        S: StreamSink + ?Sized,
    {
        match self.state {
            DemuxState::Idle => self.enter(byte),
            DemuxState::MatchTeax(matched) => {
                if byte == TEAX_MARKER[matched] {
                    self.state = if matched + 1 == TEAX_MARKER.len() {
                        self.frame_words = 0;
                        DemuxState::ReadLength(0)
                    } else {
                        DemuxState::MatchTeax(matched + 1)
                    };
                } else {
                    self.diagnostics.marker_mismatches += 1;
                    self.enter(byte);
                }
            }
            DemuxState::MatchUart(matched) => {
                if byte == UART_MARKER[matched] {
                    self.state = if matched + 1 == UART_MARKER.len() {
                        DemuxState::ReadUartLength
                    } else {
                        DemuxState::MatchUart(matched + 1)
                    };
                } else {
                    self.diagnostics.marker_mismatches += 1;
                    self.enter(byte);
                }
            }
            DemuxState::ReadLength(read) => {
                self.frame_words |= (byte as u32) << (8 * read);
                if read + 1 < 4 {
                    self.state = DemuxState::ReadLength(read + 1);
                } else if (MIN_FRAME_WORDS..=MAX_FRAME_WORDS).contains(&self.frame_words) {
                    self.video.clear();
                    self.video.reserve(self.frame_words as usize);
                    self.low_byte = None;
                    self.state = DemuxState::ReadVideo;
                } else {
                    debug!("Rejecting TEAX length of {} words", self.frame_words);
                    self.diagnostics.rejected_lengths += 1;
                    self.state = DemuxState::Idle;
                }
            }
            DemuxState::ReadVideo => match self.low_byte.take() {
                None => self.low_byte = Some(byte),
                Some(low) => {
                    self.video.push(u16::from_le_bytes([low, byte]));
                    if self.video.len() == self.frame_words as usize {
                        self.diagnostics.video_payloads += 1;
                        sink.video_payload(&self.video);
                        self.video.clear();
                        self.state = DemuxState::Idle;
                    }
                }
            },
            DemuxState::ReadUartLength => {
                self.uart_len = byte as usize;
                self.uart.clear();
                self.state = if self.uart_len == 0 {
                    DemuxState::Idle
                } else {
                    DemuxState::ReadUart
                };
            }
            DemuxState::ReadUart => {
                self.uart.push(byte);
                if self.uart.len() == self.uart_len {
                    self.diagnostics.uart_payloads += 1;
                    trace!("UART channel payload of {} bytes", self.uart.len());
                    sink.uart_payload(&self.uart);
                    self.uart.clear();
                    self.state = DemuxState::Idle;
                }
            }
        }
    }

    fn enter(&mut self, byte: u8) {
        self.state = match byte {
            b'T' => DemuxState::MatchTeax(1),
            b'U' => DemuxState::MatchUart(1),
            _ => DemuxState::Idle,
        };
    }
}

/// Wraps a command frame for the grabber's outbound UART channel.
pub fn uart_packet(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_UART_PAYLOAD {
        return Err(FrameError::PayloadTooLarge { len: payload.len() });
    }

    let mut packet = Vec::with_capacity(UART_HEADER_BYTES + payload.len());
    packet.extend_from_slice(UART_MARKER);
    packet.push(payload.len() as u8);
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Builds a `TEAX` video packet from words.
pub fn teax_packet(words: &[u16]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + words.len() * 2);
    packet.extend_from_slice(TEAX_MARKER);
    packet.extend_from_slice(&(words.len() as u32).to_le_bytes());
    for word in words {
        packet.extend_from_slice(&word.to_le_bytes());
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        video: Vec<Vec<u16>>,
        uart: Vec<Vec<u8>>,
    }

    impl StreamSink for RecordingSink {
        fn video_payload(&mut self, words: &[u16]) {
            self.video.push(words.to_vec());
        }

        fn uart_payload(&mut self, bytes: &[u8]) {
            self.uart.push(bytes.to_vec());
        }
    }

    fn mk_words(count: usize) -> Vec<u16> {
        (0..count).map(|i| (i as u16).wrapping_mul(31)).collect()
    }

    #[test]
    fn uart_payload_dispatched() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();
        let packet = uart_packet(&[0x6E, 0x00, 0x00, 0x00]).unwrap();

        demux.feed(&packet, &mut sink);
        assert_eq!(sink.uart, vec![vec![0x6E, 0x00, 0x00, 0x00]]);
        assert_eq!(demux.state(), DemuxState::Idle);
    }

    #[test]
    fn video_words_assembled_low_byte_first() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();
        let mut words = mk_words(MIN_FRAME_WORDS as usize);
        words[0] = 0x1234;
        let packet = teax_packet(&words);
        assert_eq!(&packet[8..10], &[0x34, 0x12]);

        for chunk in packet.chunks(510) {
            demux.feed(chunk, &mut sink);
        }

        assert_eq!(sink.video.len(), 1);
        assert_eq!(sink.video[0], words);
        assert_eq!(demux.diagnostics().video_payloads, 1);
    }

    #[test]
    fn out_of_range_lengths_rejected() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();

        for words in [0u32, MIN_FRAME_WORDS - 1, MAX_FRAME_WORDS + 1, u32::MAX] {
            let mut stream = TEAX_MARKER.to_vec();
            stream.extend_from_slice(&words.to_le_bytes());
            demux.feed(&stream, &mut sink);
            assert_eq!(demux.state(), DemuxState::Idle);
        }

        assert!(sink.video.is_empty());
        assert_eq!(demux.diagnostics().rejected_lengths, 4);
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();
        let mut stream = TEAX_MARKER.to_vec();
        stream.extend_from_slice(&MAX_FRAME_WORDS.to_le_bytes());
        demux.feed(&stream, &mut sink);
        assert_eq!(demux.state(), DemuxState::ReadVideo);
    }

    #[test]
    fn spurious_markers_do_not_desync() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();

        let words = mk_words(MIN_FRAME_WORDS as usize);
        let command = [0x6E, 0x00, 0x00, 0x05];
        let mut stream = b"xxTEUTEAUARxTTUUA".to_vec();
        stream.extend_from_slice(&teax_packet(&words));
        stream.extend_from_slice(b"TEA");
        stream.extend_from_slice(&uart_packet(&command).unwrap());
        stream.extend_from_slice(b"U");
        stream.extend_from_slice(&uart_packet(&command).unwrap());

        demux.feed(&stream, &mut sink);
        assert_eq!(sink.video, vec![words]);
        assert_eq!(sink.uart.len(), 2);
        assert!(sink.uart.iter().all(|p| p == &command));
        assert!(demux.diagnostics().marker_mismatches > 0);
    }

    #[test]
    fn alternate_leading_character_switches_branch() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();
        demux.feed(b"TEU", &mut sink);
        assert_eq!(demux.state(), DemuxState::MatchUart(1));
        demux.feed(b"AT", &mut sink);
        assert_eq!(demux.state(), DemuxState::MatchTeax(1));
    }

    #[test]
    fn zero_length_uart_packet_ignored() {
        let mut demux = StreamDemux::new();
        let mut sink = RecordingSink::default();
        demux.feed(b"UART\x00UART\x01\x42", &mut sink);
        assert_eq!(sink.uart, vec![vec![0x42]]);
    }

    #[test]
    fn uart_packet_layout_and_limit() {
        let packet = uart_packet(&[1, 2, 3]).unwrap();
        assert_eq!(packet, vec![b'U', b'A', b'R', b'T', 3, 1, 2, 3]);

        assert!(uart_packet(&[0u8; MAX_UART_PAYLOAD]).is_ok());
        assert_eq!(
            uart_packet(&[0u8; MAX_UART_PAYLOAD + 1]),
            Err(FrameError::PayloadTooLarge { len: 124 })
        );
    }
}
