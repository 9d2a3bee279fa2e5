//! # CRC8-DVB-S2 Implementation
//!
//! CRC-8-DVB-S2 checksum calculation for CRSF frames.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00
//!
//! The checksum covers the type byte and the payload, i.e. `length - 1` bytes
//! starting at frame offset 2.

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Run one byte through the polynomial bit by bit
const fn crc8_step(mut crc: u8) -> u8 {
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x80 != 0 { (crc << 1) ^ CRC8_POLY } else { crc << 1 };
        bit += 1;
    }
    crc
}

/// Lookup table, built at compile time
const CRC8_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc8_step(i as u8);
        i += 1;
    }
    table
};

/// Calculate CRC8-DVB-S2 checksum over a byte slice using the lookup table
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(&[]), 0x00);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter()
        .fold(0, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Calculate the CRC of a framed buffer `[address, length, type, payload…, crc]`
///
/// Covers `type + payload` as dictated by the length field at offset 1. A
/// buffer shorter than its length field claims is checksummed as far as it
/// goes.
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::crc::{compute_crc, crc8_dvb_s2};
///
/// let frame = [0xEA, 0x04, 0x1C, 0x10, 0x20, 0x00];
/// assert_eq!(compute_crc(&frame), crc8_dvb_s2(&[0x1C, 0x10, 0x20]));
/// ```
pub fn compute_crc(frame: &[u8]) -> u8 {
    let length = frame.get(1).copied().unwrap_or(0) as usize;
    let end = (2 + length.saturating_sub(1)).min(frame.len());
    let start = 2.min(end);

    crc8_dvb_s2(&frame[start..end])
}

/// Bitwise reference used to check the table
#[cfg(test)]
fn crc8_dvb_s2_slow(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &byte| crc8_step(crc ^ byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_empty() {
        let data = [];
        assert_eq!(crc8_dvb_s2(&data), 0x00);
    }

    #[test]
    fn test_crc8_single_byte() {
        let data = [0x00];
        assert_eq!(crc8_dvb_s2(&data), 0x00);

        let data = [0x01];
        assert_eq!(crc8_dvb_s2(&data), CRC8_POLY);

        let data = [0xFF];
        let crc = crc8_dvb_s2(&data);
        assert_eq!(crc, crc8_dvb_s2_slow(&data));
        assert_ne!(crc, 0x00);
    }

    #[test]
    fn test_crc8_lookup_table_matches_slow() {
        let test_data = [
            vec![0x01, 0x02, 0x03],
            vec![0xFF, 0xFE, 0xFD],
            vec![0x16, 0xE0, 0x03, 0x1F],
            vec![0x00; 24],
            vec![0xFF; 10],
        ];

        for data in test_data.iter() {
            assert_eq!(
                crc8_dvb_s2(data),
                crc8_dvb_s2_slow(data),
                "CRC mismatch for data: {:?}",
                data
            );
        }
    }

    #[test]
    fn test_compute_crc_skips_address_and_length() {
        let frame = [0xEE, 0x05, 0x16, 0xAA, 0xBB, 0xCC, 0x00];
        assert_eq!(compute_crc(&frame), crc8_dvb_s2(&[0x16, 0xAA, 0xBB, 0xCC]));

        // address and length bytes do not contribute
        let other = [0x00, 0x05, 0x16, 0xAA, 0xBB, 0xCC, 0x00];
        assert_eq!(compute_crc(&frame), compute_crc(&other));
    }

    #[test]
    fn test_compute_crc_ignores_trailing_bytes() {
        let frame = [0xEA, 0x03, 0x1C, 0x42, 0x99, 0x77, 0x66];
        assert_eq!(compute_crc(&frame), crc8_dvb_s2(&[0x1C, 0x42]));
    }

    #[test]
    fn test_compute_crc_short_buffers() {
        assert_eq!(compute_crc(&[]), 0);
        assert_eq!(compute_crc(&[0xEE]), 0);
        assert_eq!(compute_crc(&[0xEE, 0x00]), 0);
        // length claims more than is present
        assert_eq!(compute_crc(&[0xEE, 0x10, 0x16]), crc8_dvb_s2(&[0x16]));
    }

    #[test]
    fn test_crc8_detects_every_single_bit_flip() {
        let payload: Vec<u8> = (0u8..24).map(|i| i.wrapping_mul(37) ^ 0x5A).collect();
        let reference = crc8_dvb_s2(&payload);

        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut flipped = payload.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(
                    crc8_dvb_s2(&flipped),
                    reference,
                    "flip of bit {} in byte {} went undetected",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn test_crc8_order_sensitive() {
        let a = [0x16, 0x01, 0x02];
        let b = [0x16, 0x02, 0x01];
        assert_ne!(crc8_dvb_s2(&a), crc8_dvb_s2(&b));
    }
}
