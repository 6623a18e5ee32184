use core::fmt;

use log::error;

const SAMPLE_MASK: u16 = 0x3FFF;
const FLAG_MASK: u16 = 0xC000;
const LINE_VALID: u16 = 0x8000;
const HSYNC: u16 = 0x8000;
const VSYNC: u16 = 0x4000;

/// One decoded thermal image with 14-bit samples in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawThermalFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u16>,
    pub min: u16,
    pub max: u16,
    /// Milliseconds since the last external sync edge, if the payload carried one.
    pub pps_timestamp: Option<u16>,
}

impl RawThermalFrame {
    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn row(&self, y: usize) -> Option<&[u16]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.width;
        self.pixels.get(start..start + self.width)
    }

    /// Stretches the frame between its own min and max into 8-bit gray.
    pub fn to_gray8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|&v| scale(v as u32, self.min as u32, self.max as u32, 0, 255) as u8)
            .collect()
    }

    /// Gray image replicated into three interleaved channels.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.to_gray8().into_iter().flat_map(|g| [g, g, g]).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    InvalidGeometry { width: usize, height: usize },
    NoPixelData,
    ShortFrame { required: usize, available: usize },
    LineOverrun { row: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "Empty video payload"),
            DecodeError::InvalidGeometry { width, height } => {
                write!(f, "Invalid frame geometry {}x{}", width, height)
            }
            DecodeError::NoPixelData => write!(f, "No pixel data after sync words"),
            DecodeError::ShortFrame {
                required,
                available,
            } => write!(
                f,
                "Video payload too short ({} of {} words)",
                available, required
            ),
            DecodeError::LineOverrun { row } => {
                write!(f, "Video payload exhausted while reading row {}", row)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

fn is_sync_word(word: u16) -> bool {
    let flags = word & FLAG_MASK;
    flags == HSYNC || flags == VSYNC
}

/// Reassembles a `width` x `height` bitmap from one video payload.
///
/// A leading word with both flag bits clear is taken as the PPS timestamp,
/// followed by any number of HSYNC/VSYNC words. A payload of exactly
/// `width * height` words is read straight through. A longer one carries line
/// filler: between rows, words without the line-valid bit are skipped up to
/// the next line start. Any shortfall rejects the whole frame.
pub fn decode_frame(
    words: &[u16],
    width: usize,
    height: usize,
) -> Result<RawThermalFrame, DecodeError> {
    if words.is_empty() {
        return Err(DecodeError::Empty);
    }

    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidGeometry { width, height });
    }

    let mut cursor = 0usize;
    let mut pps_timestamp = None;
    if words[0] & FLAG_MASK == 0 {
        pps_timestamp = Some(words[0]);
        cursor += 1;
    }

    while cursor < words.len() && is_sync_word(words[cursor]) {
        cursor += 1;
    }

    if cursor >= words.len() {
        return Err(DecodeError::NoPixelData);
    }

    let data = &words[cursor..];
    let required = width * height;
    if data.len() < required {
        return Err(DecodeError::ShortFrame {
            required,
            available: data.len(),
        });
    }

    let has_filler = data.len() > required;
    let mut pixels = Vec::with_capacity(required);
    let mut min = u16::MAX;
    let mut max = 0u16;
    let mut idx = 0usize;

    for row in 0..height {
        let line = data
            .get(idx..idx + width)
            .ok_or(DecodeError::LineOverrun { row })?;

        for &word in line {
            let value = word & SAMPLE_MASK;
            min = min.min(value);
            max = max.max(value);
            pixels.push(value);
        }
        idx += width;

        if has_filler && row + 1 < height {
            while idx < data.len() && data[idx] & LINE_VALID == 0 {
                idx += 1;
            }
            if idx == data.len() {
                return Err(DecodeError::LineOverrun { row: row + 1 });
            }
        }
    }

    Ok(RawThermalFrame {
        width,
        height,
        pixels,
        min,
        max,
        pps_timestamp,
    })
}

/// Linearly maps `value` from `[low, high]` onto `[out_min, out_max]`.
///
/// Values at or outside the bounds clamp; a raw zero always maps to 0.
pub fn scale(value: u32, low: u32, high: u32, out_min: u32, out_max: u32) -> u32 {
    if high == low {
        error!("Scale boundaries equal: {}, {}", low, high);
        return 0;
    }

    if value == 0 {
        return 0;
    }
    if value <= low {
        return out_min;
    }
    if value >= high {
        return out_max;
    }

    let span = out_max.saturating_sub(out_min) as u64;
    let scaled = span * (value - low) as u64 / (high - low) as u64 + out_min as u64;
    (scaled as u32).clamp(out_min, out_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_frame_with_pps_and_sync_words() {
        let samples = [5u16, 3000, 16383, 0, 1, 2, 3, 4];
        for sync_words in 0..3 {
            let mut words = vec![0x0123];
            words.extend(std::iter::repeat(0x8000).take(sync_words));
            words.extend_from_slice(&samples);

            let frame = decode_frame(&words, 4, 2).unwrap();
            assert_eq!(frame.pixels, samples);
            assert_eq!(frame.min, 0);
            assert_eq!(frame.max, 16383);
            assert_eq!(frame.pps_timestamp, Some(0x0123));
        }
    }

    #[test]
    fn flag_bits_are_masked() {
        let words = [0x4000u16, 0xC005, 0xC006, 0xC007, 0xC008];
        let frame = decode_frame(&words, 2, 2).unwrap();
        assert_eq!(frame.pps_timestamp, None);
        assert_eq!(frame.pixels, vec![5, 6, 7, 8]);
        assert!(frame.pixels.iter().all(|&p| p <= 0x3FFF));
    }

    #[test]
    fn line_filler_skipped_between_rows() {
        let words = [
            0x0000u16, 0xC001, 0xC002, 0x0000, 0x1234, 0xC003, 0xC004, 0x0000,
        ];
        let frame = decode_frame(&words, 2, 2).unwrap();
        assert_eq!(frame.pixels, vec![1, 2, 3, 4]);
        assert_eq!((frame.min, frame.max), (1, 4));
    }

    #[test]
    fn short_input_rejected() {
        let words = [0x0000u16, 1, 2, 3];
        assert_eq!(
            decode_frame(&words, 2, 2),
            Err(DecodeError::ShortFrame {
                required: 4,
                available: 3
            })
        );
    }

    #[test]
    fn exact_payload_decodes_without_filler_skip() {
        let words = [0x0000u16, 0xC001, 0xC002, 0x0001, 0x0002];
        let frame = decode_frame(&words, 2, 2).unwrap();
        assert_eq!(frame.pixels, vec![1, 2, 1, 2]);
    }

    #[test]
    fn unflagged_pixels_with_padding_rejected() {
        let words = [0x0001u16, 5, 3000, 16383, 0, 1, 2, 3, 4, 0x0777];
        assert_eq!(
            decode_frame(&words, 4, 2),
            Err(DecodeError::LineOverrun { row: 1 })
        );
    }

    #[test]
    fn short_row_after_filler_rejected() {
        let words = [0x0000u16, 0xC001, 0xC002, 0x0005, 0x0006, 0xC003];
        assert_eq!(
            decode_frame(&words, 2, 2),
            Err(DecodeError::LineOverrun { row: 1 })
        );
    }

    #[test]
    fn only_sync_words_rejected() {
        assert_eq!(
            decode_frame(&[0x0001, 0x8000, 0x4000], 2, 2),
            Err(DecodeError::NoPixelData)
        );
        assert_eq!(decode_frame(&[], 2, 2), Err(DecodeError::Empty));
        assert!(matches!(
            decode_frame(&[1, 2], 0, 2),
            Err(DecodeError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn min_max_are_true_extrema() {
        let words = [0x0000u16, 10, 9, 8, 7];
        let frame = decode_frame(&words, 4, 1).unwrap();
        assert_eq!((frame.min, frame.max), (7, 10));
    }

    #[test]
    fn scale_clamps_and_maps() {
        assert_eq!(scale(0, 100, 200, 0, 255), 0);
        assert_eq!(scale(50, 100, 200, 10, 255), 10);
        assert_eq!(scale(300, 100, 200, 0, 255), 255);
        assert_eq!(scale(150, 100, 200, 0, 255), 127);
        assert_eq!(scale(150, 100, 100, 0, 255), 0);
    }

    #[test]
    fn gray_and_rgb_conversion() {
        let frame = RawThermalFrame {
            width: 3,
            height: 1,
            pixels: vec![1000, 2000, 3000],
            min: 1000,
            max: 3000,
            pps_timestamp: None,
        };
        assert_eq!(frame.to_gray8(), vec![0, 127, 255]);
        assert_eq!(frame.to_rgb8(), vec![0, 0, 0, 127, 127, 127, 255, 255, 255]);
        assert_eq!(frame.pixel(2, 0), Some(3000));
        assert_eq!(frame.row(1), None);
    }
}
