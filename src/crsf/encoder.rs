//! # CRSF Frame Encoder
//!
//! Builds outbound telemetry frames and, for the handset side of bench tests
//! and simulations, RC channels frames.

use super::crc::compute_crc;
use super::protocol::*;

/// Assemble `[address, length, type, payload…, crc]`
///
/// The length field is `(overhead - 2) + payload.len()`, i.e. it counts type,
/// payload and crc.
fn assemble_frame(address: u8, frame_type: u8, payload: &[u8]) -> Frame {
    debug_assert!(payload.len() + CRSF_FRAME_OVERHEAD <= CRSF_FRAME_CAPACITY);

    let mut frame = Frame::new();
    frame.push(address);
    frame.push((CRSF_FRAME_OVERHEAD - 2 + payload.len()) as u8);
    frame.push(frame_type);
    for &byte in payload {
        frame.push(byte);
    }

    let crc = compute_crc(frame.as_bytes());
    frame.push(crc);
    frame
}

/// Serialize a link statistics payload into `out`
///
/// # Returns
///
/// * `usize` - Number of bytes written (the variant's fixed payload size)
///
/// # Panics
///
/// Panics if `out` is shorter than the payload size of the variant.
pub fn encode_link_stats_payload(payload: &LinkStatsPayload, out: &mut [u8]) -> usize {
    match payload {
        LinkStatsPayload::Combined(stats) => {
            out[0] = stats.uplink_rssi_1;
            out[1] = stats.uplink_rssi_2;
            out[2] = stats.uplink_lq;
            out[3] = stats.uplink_snr as u8;
            out[4] = stats.active_antenna;
            out[5] = stats.rf_mode;
            out[6] = stats.uplink_tx_power;
            out[7] = stats.downlink_rssi;
            out[8] = stats.downlink_lq;
            out[9] = stats.downlink_snr as u8;
        }
        LinkStatsPayload::Uplink(stats) => {
            out[0] = stats.uplink_rssi;
            out[1] = stats.uplink_rssi_percent;
            out[2] = stats.uplink_lq;
            out[3] = stats.uplink_snr as u8;
            out[4] = stats.downlink_tx_power;
            out[5] = stats.uplink_fps;
        }
        LinkStatsPayload::Downlink(stats) => {
            out[0] = stats.downlink_rssi;
            out[1] = stats.downlink_rssi_percent;
            out[2] = stats.downlink_lq;
            out[3] = stats.downlink_snr as u8;
            out[4] = stats.uplink_tx_power;
        }
    }

    payload.payload_len()
}

/// Build a complete link statistics telemetry frame
///
/// # Arguments
///
/// * `address` - Destination address (normally [`CRSF_ADDRESS_RADIO`])
/// * `payload` - One of the three link statistics variants
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::encoder::build_telemetry_frame;
/// use crsf_bridge::crsf::protocol::*;
///
/// let payload = LinkStatsPayload::Combined(LinkStatistics::default());
/// let frame = build_telemetry_frame(CRSF_ADDRESS_RADIO, &payload);
///
/// assert_eq!(frame.len(), 14);
/// assert_eq!(frame.length_field(), 12);
/// assert_eq!(frame.frame_type(), CRSF_FRAMETYPE_LINK_STATISTICS);
/// ```
pub fn build_telemetry_frame(address: u8, payload: &LinkStatsPayload) -> Frame {
    let mut bytes = [0u8; CRSF_LINK_STATS_PAYLOAD_SIZE];
    let len = encode_link_stats_payload(payload, &mut bytes);

    assemble_frame(address, payload.frame_type(), &bytes[..len])
}

/// Encode RC channels into a complete CRSF frame
///
/// # Arguments
///
/// * `address` - Destination address (normally [`CRSF_ADDRESS_MODULE`])
/// * `channels` - 16 wire channel values (11-bit, nominally 172-1811)
///
/// # Returns
///
/// * `Frame` - 26 bytes: address + length + type + 22-byte payload + crc
pub fn encode_rc_channels_frame(address: u8, channels: &RcChannels) -> Frame {
    let payload = encode_rc_channels_payload(channels);

    assemble_frame(address, CRSF_FRAMETYPE_RC_CHANNELS_PACKED, &payload)
}

/// Encode RC channels into payload (22 bytes)
///
/// Packs 16 channels (11 bits each) into 22 bytes using bit packing.
/// Channels are packed as a continuous bitstream, LSB first.
///
/// # Algorithm
///
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
pub fn encode_rc_channels_payload(channels: &RcChannels) -> [u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
    let mut payload = [0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    let mut bit_index = 0;

    for &channel in channels.iter() {
        let value = clamp_channel_value(channel);

        for bit in 0..11 {
            if (value >> bit) & 1 == 1 {
                payload[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    payload
}

/// Clamp a channel value to the 11-bit range (0-2047)
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(CRSF_CHANNEL_VALUE_MAX)
}
