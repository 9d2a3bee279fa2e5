//! # Error Types
//!
//! Custom error types for the CRSF bridge using `thiserror`.
//!
//! Protocol-level faults on the wire (stray bytes, truncated frames, CRC
//! mismatches, dropped telemetry) are recovered inside the state machine and
//! never show up here. These errors cover the host side only.

use thiserror::Error;

/// Main error type for the CRSF bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// CRSF protocol errors
    #[error("CRSF protocol error: {0}")]
    CrsfProtocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the CRSF bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
