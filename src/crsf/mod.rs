//! # CRSF Protocol Module
//!
//! Half-duplex CRSF bridge between a handset and the radio link.
//!
//! This module handles:
//! - Byte-by-byte frame reception with inactivity timeout and resync
//! - Line turnaround to answer a received frame with queued telemetry
//! - Link statistics frame assembly (combined, uplink, downlink)
//! - RC channels unpacking and remapping (16 channels, 11-bit resolution)
//! - CRC8-DVB-S2 checksum calculation

pub mod bridge;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod protocol;
pub mod shared;
