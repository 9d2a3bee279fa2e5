//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for the half-duplex CRSF bridge.
//!
//! Frame structure on the wire:
//!
//! ```text
//! [address:1][length:1][type:1][payload:length-2][crc:1]
//! ```
//!
//! `length` counts the bytes following it (type + payload + crc).

use std::fmt;

use crate::error::{BridgeError, Result};

/// Address of the module side. Frames from the handset carry this address.
pub const CRSF_ADDRESS_MODULE: u8 = 0xEE;

/// Address of the radio (handset) side. Telemetry replies carry this address.
pub const CRSF_ADDRESS_RADIO: u8 = 0xEA;

/// RC Channels packet type
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Link Statistics packet type (uplink + downlink)
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// Downlink-only Link Statistics packet type
pub const CRSF_FRAMETYPE_LINK_STATISTICS_RX: u8 = 0x1C;

/// Uplink-only Link Statistics packet type
pub const CRSF_FRAMETYPE_LINK_STATISTICS_TX: u8 = 0x1D;

/// Capacity of the receive and transmit frame buffers
pub const CRSF_FRAME_CAPACITY: usize = 128;

/// Address + length + type + crc
pub const CRSF_FRAME_OVERHEAD: usize = 4;

/// Smallest legal length field (type + crc, empty payload)
pub const CRSF_MIN_LENGTH_FIELD: u8 = 2;

/// Largest length field that still fits the frame buffer
pub const CRSF_MAX_LENGTH_FIELD: u8 = (CRSF_FRAME_CAPACITY - 2) as u8;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// RC channels frame length field (type + payload + crc)
pub const CRSF_RC_CHANNELS_FRAME_LENGTH: u8 = 0x18; // 24 bytes

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Internal channel value range (11-bit: 0-2047)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 0;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 2047;
pub const CRSF_CHANNEL_VALUE_CENTER: u16 = 1024;

/// Wire channel value range (172 .. 992 .. 1811)
pub const CRSF_WIRE_VALUE_MIN: u16 = 172;
pub const CRSF_WIRE_VALUE_CENTER: u16 = 992;
pub const CRSF_WIRE_VALUE_MAX: u16 = 1811;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Downlink-only Link Statistics payload size
pub const CRSF_LINK_STATS_RX_PAYLOAD_SIZE: usize = 5;

/// Uplink-only Link Statistics payload size
pub const CRSF_LINK_STATS_TX_PAYLOAD_SIZE: usize = 6;

/// Default inter-byte inactivity timeout.
///
/// A frame arrives every 4 ms, is at most 64 bytes long, a byte takes 25 us
/// and the gap between frames is about 1 ms.
pub const CRSF_INACTIVITY_TIMEOUT_US: u16 = 500;

/// RC channels array type (16 channels, 11-bit values)
pub type RcChannels = [u16; CRSF_NUM_CHANNELS];

/// Transmit power as encoded in link statistics frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CrsfPower {
    Mw0 = 0,
    Mw10 = 1,
    Mw25 = 2,
    Mw100 = 3,
    Mw500 = 4,
    Mw1000 = 5,
    Mw2000 = 6,
    Mw250 = 7,
    Mw50 = 8,
}

impl CrsfPower {
    /// Map a power level in milliwatts onto its wire code.
    ///
    /// Returns `None` for levels the protocol cannot express.
    pub fn from_milliwatts(mw: u16) -> Option<Self> {
        match mw {
            0 => Some(Self::Mw0),
            10 => Some(Self::Mw10),
            25 => Some(Self::Mw25),
            50 => Some(Self::Mw50),
            100 => Some(Self::Mw100),
            250 => Some(Self::Mw250),
            500 => Some(Self::Mw500),
            1000 => Some(Self::Mw1000),
            2000 => Some(Self::Mw2000),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Link statistics telemetry data (uplink and downlink combined)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (see [`CrsfPower`])
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

/// Uplink-only link statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatisticsUplink {
    /// Uplink RSSI in -dBm
    pub uplink_rssi: u8,

    /// Uplink RSSI scaled to 0-100%
    pub uplink_rssi_percent: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Downlink TX power (see [`CrsfPower`])
    pub downlink_tx_power: u8,

    /// Uplink frames per second / 10
    pub uplink_fps: u8,
}

/// Downlink-only link statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatisticsDownlink {
    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink RSSI scaled to 0-100%
    pub downlink_rssi_percent: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,

    /// Uplink TX power (see [`CrsfPower`])
    pub uplink_tx_power: u8,
}

/// One of the three link statistics payloads the bridge can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatsPayload {
    Combined(LinkStatistics),
    Uplink(LinkStatisticsUplink),
    Downlink(LinkStatisticsDownlink),
}

impl LinkStatsPayload {
    /// Frame type byte for this payload
    pub fn frame_type(&self) -> u8 {
        match self {
            Self::Combined(_) => CRSF_FRAMETYPE_LINK_STATISTICS,
            Self::Uplink(_) => CRSF_FRAMETYPE_LINK_STATISTICS_TX,
            Self::Downlink(_) => CRSF_FRAMETYPE_LINK_STATISTICS_RX,
        }
    }

    /// Fixed payload size in bytes
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Combined(_) => CRSF_LINK_STATS_PAYLOAD_SIZE,
            Self::Uplink(_) => CRSF_LINK_STATS_TX_PAYLOAD_SIZE,
            Self::Downlink(_) => CRSF_LINK_STATS_RX_PAYLOAD_SIZE,
        }
    }
}

/// Coarse classification of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// RC channels, forwarded to the channel consumer
    ChannelData,
    /// Anything else; ignored by the bridge
    Other,
}

/// Framing state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolState {
    Idle,
    ReceivingLength,
    ReceivingPayload,
    ReceivingCrc,
    TransmitPending,
    Transmitting,
}

impl ProtocolState {
    /// True for the two states following a completed receive
    pub fn is_transmit_phase(self) -> bool {
        self >= Self::TransmitPending
    }
}

/// Outcome of feeding one byte to the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitDecision {
    /// The outbound frame was queued on the transport; start shifting it out
    StartTransmit,
    /// Keep listening
    NoTransmit,
}

/// Fixed-capacity CRSF frame: `[address, length, type, payload…, crc]`
#[derive(Clone, Copy)]
pub struct Frame {
    buf: [u8; CRSF_FRAME_CAPACITY],
    len: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02X?})", self.as_bytes())
    }
}

impl Frame {
    /// Create an empty frame
    pub const fn new() -> Self {
        Self {
            buf: [0u8; CRSF_FRAME_CAPACITY],
            len: 0,
        }
    }

    /// Copy raw wire bytes into a frame
    ///
    /// # Errors
    ///
    /// Returns error if `bytes` exceeds the frame capacity (128 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > CRSF_FRAME_CAPACITY {
            return Err(BridgeError::CrsfProtocol(format!(
                "Frame size {} exceeds capacity {}",
                bytes.len(),
                CRSF_FRAME_CAPACITY
            )));
        }

        let mut frame = Self::new();
        frame.buf[..bytes.len()].copy_from_slice(bytes);
        frame.len = bytes.len();
        Ok(frame)
    }

    /// Bytes stored so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn address(&self) -> u8 {
        self.buf[0]
    }

    /// Length field: number of bytes after it (type + payload + crc)
    pub fn length_field(&self) -> u8 {
        self.buf[1]
    }

    pub fn frame_type(&self) -> u8 {
        self.buf[2]
    }

    /// Payload between the type byte and the CRC
    pub fn payload(&self) -> &[u8] {
        if self.len < CRSF_FRAME_OVERHEAD {
            return &[];
        }
        &self.buf[3..self.len - 1]
    }

    /// Trailing CRC byte
    pub fn crc(&self) -> Option<u8> {
        if self.len < CRSF_FRAME_OVERHEAD {
            return None;
        }
        Some(self.buf[self.len - 1])
    }

    /// Append one byte. Returns `false` and leaves the frame untouched once
    /// the buffer is full.
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        match self.buf.get_mut(self.len) {
            Some(slot) => {
                *slot = byte;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}
