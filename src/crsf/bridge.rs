//! # CRSF Half-Duplex Bridge
//!
//! Frame state machine for a single-wire CRSF link. The handset drives the
//! line; the bridge receives its frames byte by byte and, right after a frame
//! has been received completely, may turn the line around to answer with one
//! queued telemetry frame.
//!
//! ## Entry points
//!
//! - [`CrsfBridge::on_byte_received`] - receive-byte interrupt
//! - [`CrsfBridge::on_transmit_complete`] - transmit-complete interrupt
//!
//! Both take `&mut self`, never allocate and never wait. Code running outside
//! the interrupts (telemetry producers, the channel consumer) must go through
//! [`SharedBridge`](super::shared::SharedBridge) so the check-then-write on
//! the outbound buffer cannot interleave with an interrupt.
//!
//! ## Received CRC
//!
//! The CRC byte of a received frame is stored but **not** checked here. A
//! frame with a bad CRC still completes, still triggers the turnaround and is
//! still handed to the consumer. Consumers that care can re-check it with
//! [`verify_crc`](super::decoder::verify_crc).

use tracing::{debug, trace};

use super::protocol::*;

/// Line control towards the UART peripheral
#[cfg_attr(test, mockall::automock)]
pub trait HalfDuplexTransport {
    /// Switch the line direction. `true` disables the receiver and readies
    /// the transmitter, `false` switches back to receive.
    fn set_transmit_enabled(&mut self, enabled: bool);

    /// Put one byte into the transmit FIFO
    fn queue_byte(&mut self, byte: u8);
}

/// Free-running microsecond counter, wrapping at 16 bits
pub trait MicrosClock {
    fn now_us(&self) -> u16;
}

/// Tunables of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Address a frame must start with to be received
    pub module_address: u8,

    /// Maximum gap between two bytes of one frame
    pub inactivity_timeout_us: u16,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            module_address: CRSF_ADDRESS_MODULE,
            inactivity_timeout_us: CRSF_INACTIVITY_TIMEOUT_US,
        }
    }
}

/// Observability counters. Nothing in the bridge depends on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames received completely
    pub frames_received: u32,
    /// Partial frames dropped after an inactivity timeout
    pub timeouts: u32,
    /// Bytes discarded while waiting for the module address
    pub resync_bytes: u32,
    /// Frames abandoned because of an impossible length field
    pub rejected_lengths: u32,
    /// Telemetry frames handed to the transport
    pub frames_transmitted: u32,
    /// Telemetry frames dropped because one was already pending
    pub dropped_enqueues: u32,
}

/// CRSF frame state machine
pub struct CrsfBridge<T, C> {
    transport: T,
    clock: C,
    settings: BridgeSettings,

    state: ProtocolState,
    length: u8,
    last_byte_us: u16,

    rx_frame: Frame,
    frame_received: bool,

    // non-empty means a reply is waiting for the next turnaround
    tx_frame: Frame,

    stats: BridgeStats,
}

impl<T, C> std::fmt::Debug for CrsfBridge<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsfBridge")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("tx_pending", &!self.tx_frame.is_empty())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T, C> CrsfBridge<T, C>
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    /// Create a bridge in `Idle` with the line switched to receive
    pub fn new(mut transport: T, clock: C, settings: BridgeSettings) -> Self {
        transport.set_transmit_enabled(false);

        Self {
            transport,
            clock,
            settings,
            state: ProtocolState::Idle,
            length: 0,
            last_byte_us: 0,
            rx_frame: Frame::new(),
            frame_received: false,
            tx_frame: Frame::new(),
            stats: BridgeStats::default(),
        }
    }

    /// Feed one received byte
    ///
    /// Returns [`TransmitDecision::StartTransmit`] when the byte completed a
    /// frame and a queued telemetry frame has just been put on the transport;
    /// the caller then starts shifting the transmit FIFO out.
    pub fn on_byte_received(&mut self, byte: u8) -> TransmitDecision {
        if self.state.is_transmit_phase() {
            // the previous cycle was never closed by a transmit-complete
            self.state = ProtocolState::Idle;
        }

        self.parse_byte(byte);
        self.transmit_start()
    }

    /// The transmit FIFO has drained: hand the line back to the receiver
    pub fn on_transmit_complete(&mut self) {
        self.transport.set_transmit_enabled(false);
        self.state = ProtocolState::Idle;
    }

    /// True while an outbound frame waits for the next turnaround
    pub fn is_transmit_pending(&self) -> bool {
        !self.tx_frame.is_empty()
    }

    /// Queue an outbound frame for the next turnaround
    ///
    /// At most one frame is queued; while one is pending the new frame is
    /// dropped and `false` is returned.
    pub fn enqueue(&mut self, frame: Frame) -> bool {
        if self.is_transmit_pending() {
            self.stats.dropped_enqueues = self.stats.dropped_enqueues.wrapping_add(1);
            debug!(
                frame_type = frame.frame_type(),
                "Telemetry frame dropped, previous frame still pending"
            );
            return false;
        }

        self.tx_frame = frame;
        true
    }

    /// Take the most recently completed frame, once
    ///
    /// A frame that is not taken before the next frame starts is superseded.
    pub fn take_received_frame(&mut self) -> Option<Frame> {
        if !self.frame_received {
            return None;
        }

        self.frame_received = false;
        Some(self.rx_frame)
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn parse_byte(&mut self, byte: u8) {
        let now_us = self.clock.now_us();

        if self.state != ProtocolState::Idle {
            let elapsed_us = now_us.wrapping_sub(self.last_byte_us);
            if elapsed_us > self.settings.inactivity_timeout_us {
                trace!(elapsed_us, state = ?self.state, "Inactivity timeout, dropping partial frame");
                self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
                self.state = ProtocolState::Idle;
            }
        }

        self.last_byte_us = now_us;

        match self.state {
            ProtocolState::Idle => {
                if byte == self.settings.module_address {
                    self.rx_frame.clear();
                    self.frame_received = false;
                    self.rx_frame.push(byte);
                    self.state = ProtocolState::ReceivingLength;
                } else {
                    self.stats.resync_bytes = self.stats.resync_bytes.wrapping_add(1);
                }
            }
            ProtocolState::ReceivingLength => {
                // the only bounds check: a frame that fits keeps every later
                // push inside the buffer
                if !(CRSF_MIN_LENGTH_FIELD..=CRSF_MAX_LENGTH_FIELD).contains(&byte) {
                    trace!(length = byte, "Rejecting length field");
                    self.stats.rejected_lengths = self.stats.rejected_lengths.wrapping_add(1);
                    self.state = ProtocolState::Idle;
                    return;
                }

                self.rx_frame.push(byte);
                self.length = byte;
                self.state = ProtocolState::ReceivingPayload;
            }
            ProtocolState::ReceivingPayload => {
                self.rx_frame.push(byte);
                if self.rx_frame.len() >= self.length as usize + 1 {
                    self.state = ProtocolState::ReceivingCrc;
                }
            }
            ProtocolState::ReceivingCrc => {
                // stored, not checked
                self.rx_frame.push(byte);
                self.frame_received = true;
                self.stats.frames_received = self.stats.frames_received.wrapping_add(1);
                self.state = ProtocolState::TransmitPending;
            }
            ProtocolState::TransmitPending | ProtocolState::Transmitting => {}
        }
    }

    fn transmit_start(&mut self) -> TransmitDecision {
        if !self.state.is_transmit_phase() {
            return TransmitDecision::NoTransmit;
        }

        if self.tx_frame.is_empty() || self.state != ProtocolState::TransmitPending {
            self.state = ProtocolState::Idle;
            return TransmitDecision::NoTransmit;
        }

        self.transport.set_transmit_enabled(true);
        for &byte in self.tx_frame.as_bytes() {
            self.transport.queue_byte(byte);
        }

        self.tx_frame.clear();
        self.stats.frames_transmitted = self.stats.frames_transmitted.wrapping_add(1);
        self.state = ProtocolState::Transmitting;
        TransmitDecision::StartTransmit
    }
}
