//! Host-side transport and clock for the bridge state machine.
//!
//! On the host there is no transmit FIFO to fill from an interrupt, so
//! [`BufferedTransport`] collects the queued burst and the serial driver
//! writes it out in one go.

use std::time::Instant;

use bytes::{Bytes, BytesMut};

use crate::crsf::bridge::{HalfDuplexTransport, MicrosClock};
use crate::crsf::protocol::CRSF_FRAME_CAPACITY;

/// Transport that buffers one transmit burst
#[derive(Debug)]
pub struct BufferedTransport {
    transmit_enabled: bool,
    pending: BytesMut,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self {
            transmit_enabled: false,
            pending: BytesMut::with_capacity(CRSF_FRAME_CAPACITY),
        }
    }

    /// Take the bytes queued since the last call
    pub fn take_pending(&mut self) -> Bytes {
        self.pending.split().freeze()
    }

    /// Line direction as last requested by the bridge
    pub fn is_transmit_enabled(&self) -> bool {
        self.transmit_enabled
    }
}

impl Default for BufferedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HalfDuplexTransport for BufferedTransport {
    fn set_transmit_enabled(&mut self, enabled: bool) {
        self.transmit_enabled = enabled;
    }

    fn queue_byte(&mut self, byte: u8) {
        self.pending.extend_from_slice(&[byte]);
    }
}

/// Microsecond clock based on [`Instant`], truncated to 16 bits
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    origin: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrosClock for InstantClock {
    fn now_us(&self) -> u16 {
        // wraps like the hardware counter
        self.origin.elapsed().as_micros() as u16
    }
}
