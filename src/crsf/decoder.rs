//! # CRSF Frame Decoder
//!
//! Classification of received frames, RC channel unpacking and remapping,
//! and decoding of link statistics payloads.

use super::crc::compute_crc;
use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Classify a received frame by its type byte
pub fn classify(frame: &Frame) -> FrameKind {
    if frame.len() > 2 && frame.frame_type() == CRSF_FRAMETYPE_RC_CHANNELS_PACKED {
        FrameKind::ChannelData
    } else {
        FrameKind::Other
    }
}

/// Check the trailing CRC of a complete frame
///
/// The bridge itself never gates on this; it is offered to consumers that
/// want to re-validate what the state machine accepted.
pub fn verify_crc(frame: &Frame) -> bool {
    let bytes = frame.as_bytes();
    if bytes.len() < CRSF_FRAME_OVERHEAD || bytes.len() != frame.length_field() as usize + 2 {
        return false;
    }

    frame.crc() == Some(compute_crc(bytes))
}

/// Unpack 16 LSB-first 11-bit channel values from a packed payload
///
/// Bits beyond the end of `payload` read as zero.
pub fn unpack_channels(payload: &[u8]) -> RcChannels {
    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut bit_index = 0;

    for channel in channels.iter_mut() {
        for bit in 0..11 {
            let byte = payload.get(bit_index / 8).copied().unwrap_or(0);
            if (byte >> (bit_index % 8)) & 1 == 1 {
                *channel |= 1 << bit;
            }
            bit_index += 1;
        }
    }

    channels
}

/// Rescale one wire value (172 .. 992 .. 1811) into the internal range
/// (0 .. 1024 .. 2047)
///
/// Integer arithmetic with truncating division. Inputs outside the nominal
/// wire range are clamped to the internal range.
pub fn remap_channel_value(raw: u16) -> u16 {
    let center = CRSF_WIRE_VALUE_CENTER as i32;
    let value = ((raw as i32 - center) * 2047) / 1638 + CRSF_CHANNEL_VALUE_CENTER as i32;

    value.clamp(CRSF_CHANNEL_VALUE_MIN as i32, CRSF_CHANNEL_VALUE_MAX as i32) as u16
}

/// Unpack and remap the 16 channels of an RC channels payload
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::decoder::remap_channels;
/// use crsf_bridge::crsf::encoder::encode_rc_channels_payload;
///
/// let payload = encode_rc_channels_payload(&[992u16; 16]);
/// assert_eq!(remap_channels(&payload), [1024u16; 16]);
/// ```
pub fn remap_channels(raw_payload: &[u8]) -> RcChannels {
    let mut channels = unpack_channels(raw_payload);
    for channel in channels.iter_mut() {
        *channel = remap_channel_value(*channel);
    }
    channels
}

/// Decode and validate a complete CRSF frame from raw bytes
///
/// # Errors
///
/// Returns error if:
/// - Frame is too short
/// - Length field is out of range or disagrees with the buffer
/// - CRC check fails
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    // Minimum frame size: address(1) + length(1) + type(1) + crc(1) = 4 bytes
    if bytes.len() < CRSF_FRAME_OVERHEAD {
        return Err(BridgeError::CrsfProtocol("Frame too short".to_string()));
    }

    let length = bytes[1];
    if !(CRSF_MIN_LENGTH_FIELD..=CRSF_MAX_LENGTH_FIELD).contains(&length) {
        return Err(BridgeError::CrsfProtocol(format!(
            "Invalid length field: {}",
            length
        )));
    }

    let total = length as usize + 2;
    if bytes.len() < total {
        return Err(BridgeError::CrsfProtocol(format!(
            "Frame too short: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }

    let frame = Frame::from_bytes(&bytes[..total])?;
    let calculated_crc = compute_crc(frame.as_bytes());
    let received_crc = bytes[total - 1];

    if calculated_crc != received_crc {
        return Err(BridgeError::CrsfProtocol(format!(
            "CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
            calculated_crc, received_crc
        )));
    }

    Ok(frame)
}

/// Decode combined Link Statistics payload (10 bytes)
pub fn decode_link_statistics(payload: &[u8]) -> Result<LinkStatistics> {
    if payload.len() < CRSF_LINK_STATS_PAYLOAD_SIZE {
        return Err(BridgeError::CrsfProtocol(format!(
            "Link stats payload too short: {} bytes",
            payload.len()
        )));
    }

    Ok(LinkStatistics {
        uplink_rssi_1: payload[0],
        uplink_rssi_2: payload[1],
        uplink_lq: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: payload[7],
        downlink_lq: payload[8],
        downlink_snr: payload[9] as i8,
    })
}

/// Decode uplink-only Link Statistics payload (6 bytes)
pub fn decode_link_statistics_uplink(payload: &[u8]) -> Result<LinkStatisticsUplink> {
    if payload.len() < CRSF_LINK_STATS_TX_PAYLOAD_SIZE {
        return Err(BridgeError::CrsfProtocol(format!(
            "Uplink stats payload too short: {} bytes",
            payload.len()
        )));
    }

    Ok(LinkStatisticsUplink {
        uplink_rssi: payload[0],
        uplink_rssi_percent: payload[1],
        uplink_lq: payload[2],
        uplink_snr: payload[3] as i8,
        downlink_tx_power: payload[4],
        uplink_fps: payload[5],
    })
}

/// Decode downlink-only Link Statistics payload (5 bytes)
pub fn decode_link_statistics_downlink(payload: &[u8]) -> Result<LinkStatisticsDownlink> {
    if payload.len() < CRSF_LINK_STATS_RX_PAYLOAD_SIZE {
        return Err(BridgeError::CrsfProtocol(format!(
            "Downlink stats payload too short: {} bytes",
            payload.len()
        )));
    }

    Ok(LinkStatisticsDownlink {
        downlink_rssi: payload[0],
        downlink_rssi_percent: payload[1],
        downlink_lq: payload[2],
        downlink_snr: payload[3] as i8,
        uplink_tx_power: payload[4],
    })
}
