//! # Channel Consumer
//!
//! Delivery of received RC channels frames to whatever drives the flight
//! controls. Frames taken from the bridge are classified; channel frames are
//! remapped into the internal 0-2047 range and handed to a [`ChannelSink`],
//! everything else is ignored.

use tracing::{debug, info};

use crate::crsf::decoder::{classify, remap_channels, verify_crc};
use crate::crsf::protocol::{Frame, FrameKind, RcChannels};

/// Number of channel frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 1000;

/// Receives the remapped channels of every completed channel frame
#[cfg_attr(test, mockall::automock)]
pub trait ChannelSink {
    fn on_channels(&mut self, channels: &RcChannels);
}

impl<S: ChannelSink + ?Sized> ChannelSink for Box<S> {
    fn on_channels(&mut self, channels: &RcChannels) {
        (**self).on_channels(channels);
    }
}

impl<S: ChannelSink> ChannelSink for Option<S> {
    fn on_channels(&mut self, channels: &RcChannels) {
        if let Some(sink) = self {
            sink.on_channels(channels);
        }
    }
}

impl<A: ChannelSink, B: ChannelSink> ChannelSink for (A, B) {
    fn on_channels(&mut self, channels: &RcChannels) {
        self.0.on_channels(channels);
        self.1.on_channels(channels);
    }
}

/// Classify `frame` and forward it to `sink` if it carries channel data
///
/// The CRC is not a gate here either; a mismatch is only logged.
pub fn dispatch_frame<S: ChannelSink + ?Sized>(frame: &Frame, sink: &mut S) -> FrameKind {
    let kind = classify(frame);

    if kind == FrameKind::ChannelData {
        if !verify_crc(frame) {
            debug!(crc = ?frame.crc(), "Channel frame with CRC mismatch forwarded");
        }
        sink.on_channels(&remap_channels(frame.payload()));
    }

    kind
}

/// Sink that reports channel traffic through `tracing`
#[derive(Debug, Default)]
pub struct LoggingSink {
    frames: u64,
    last: Option<RcChannels>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel frames seen so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Most recent channel values
    pub fn last(&self) -> Option<&RcChannels> {
        self.last.as_ref()
    }
}

impl ChannelSink for LoggingSink {
    fn on_channels(&mut self, channels: &RcChannels) {
        self.frames += 1;
        self.last = Some(*channels);

        if self.frames % LOG_INTERVAL_FRAMES == 0 {
            info!(
                "Received {} channel frames (ch1-4: {:?})",
                self.frames,
                &channels[..4]
            );
        }
    }
}
