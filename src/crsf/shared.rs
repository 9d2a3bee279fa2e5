//! # Shared Bridge
//!
//! Critical-section guarded ownership of a [`CrsfBridge`].
//!
//! The receive-byte and transmit-complete interrupts and the main-context
//! telemetry producer all reach the same bridge. Every access runs inside
//! `critical_section::with`, so the producer's "is a frame pending? if not,
//! write one" can never be split by an interrupt. On a single-core MCU the
//! critical section masks interrupts; on the host it is a process-wide lock.

use core::cell::RefCell;

use critical_section::Mutex;

use super::bridge::{BridgeStats, CrsfBridge, HalfDuplexTransport, MicrosClock};
use super::protocol::{Frame, ProtocolState, TransmitDecision};

/// A [`CrsfBridge`] reachable from interrupt and main context
pub struct SharedBridge<T, C> {
    inner: Mutex<RefCell<CrsfBridge<T, C>>>,
}

impl<T, C> SharedBridge<T, C>
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    pub fn new(bridge: CrsfBridge<T, C>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(bridge)),
        }
    }

    /// Run `f` with exclusive access to the bridge
    ///
    /// Keep `f` short: interrupts are held off for its whole duration.
    pub fn with<R>(&self, f: impl FnOnce(&mut CrsfBridge<T, C>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    /// Receive-byte interrupt entry point
    pub fn on_byte_received(&self, byte: u8) -> TransmitDecision {
        self.with(|bridge| bridge.on_byte_received(byte))
    }

    /// Transmit-complete interrupt entry point
    pub fn on_transmit_complete(&self) {
        self.with(|bridge| bridge.on_transmit_complete());
    }

    pub fn is_transmit_pending(&self) -> bool {
        self.with(|bridge| bridge.is_transmit_pending())
    }

    /// Check-then-write of the outbound frame as one atomic step
    pub fn enqueue(&self, frame: Frame) -> bool {
        self.with(|bridge| bridge.enqueue(frame))
    }

    pub fn take_received_frame(&self) -> Option<Frame> {
        self.with(|bridge| bridge.take_received_frame())
    }

    pub fn state(&self) -> ProtocolState {
        self.with(|bridge| bridge.state())
    }

    pub fn stats(&self) -> BridgeStats {
        self.with(|bridge| bridge.stats())
    }
}
