/// CRC-16/CCITT polynomial used by the Tau serial protocol.
const CRC16_POLY: u16 = 0x1021;

/// Shifts one message byte MSB-first through the CRC register.
fn shift_byte(mut crc: u16, byte: u8) -> u16 {
    let mut mask = 0x80u8;

    for _ in 0..8 {
        let carry = (crc & 0x8000) != 0;
        crc <<= 1;

        if (byte & mask) != 0 {
            crc |= 1;
        }

        if carry {
            crc ^= CRC16_POLY;
        }

        mask >>= 1;
    }

    crc
}

/// Pushes sixteen zero bits through the register.
fn augment(mut crc: u16) -> u16 {
    for _ in 0..16 {
        let carry = (crc & 0x8000) != 0;
        crc <<= 1;
        if carry {
            crc ^= CRC16_POLY;
        }
    }

    crc
}

/// Computes the CRC-16 the Tau core uses to protect frame headers and payloads.
///
/// This is the bit-serial CCITT form with a zero seed followed by a 16-bit
/// zero augmentation pass. Unlike the plain table-driven CCITT variant with a
/// `0xFFFF` seed, the message is shifted in through the low end of the register
/// and only the augmentation flushes it out.
pub fn tau_crc16(data: &[u8]) -> u16 {
    let crc = data.iter().fold(0u16, |crc, &byte| shift_byte(crc, byte));
    augment(crc)
}

#[cfg(test)]
mod tests {
    use super::tau_crc16;

    #[test]
    fn crc_empty_is_zero() {
        assert_eq!(tau_crc16(&[]), 0);
    }

    #[test]
    fn crc_all_zero_header() {
        assert_eq!(tau_crc16(&[0u8; 6]), 0x0000);
    }

    #[test]
    fn crc_known_vectors() {
        assert_eq!(tau_crc16(b"123456789"), 0x31C3);
        assert_eq!(tau_crc16(&[0x6E, 0x00, 0x00, 0x00, 0x00, 0x00]), 0xDFBB);
    }

    #[test]
    fn crc_matches_xmodem_catalogue_entry() {
        let xmodem = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
        let samples: [&[u8]; 4] = [
            b"",
            &[0x6E, 0x00, 0x00, 0x66, 0x00, 0x00],
            &[0xFF; 37],
            b"46640013H-SPNLX^46640013H",
        ];

        for sample in samples {
            assert_eq!(tau_crc16(sample), xmodem.checksum(sample));
        }
    }

    #[test]
    fn crc_over_message_and_its_crc_is_zero() {
        let mut message = vec![0x6E, 0x00, 0x00, 0x0A, 0x00, 0x02];
        let crc = tau_crc16(&message);
        message.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(tau_crc16(&message), 0);
    }

    #[test]
    fn crc_is_deterministic() {
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(tau_crc16(&data), tau_crc16(&data));
    }
}
