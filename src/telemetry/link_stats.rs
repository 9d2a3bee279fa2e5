//! # Link Statistics Producer
//!
//! Builds the three link statistics payloads from a [`LinkStatsSource`] and
//! queues them on the bridge for the next turnaround.

use serde::Deserialize;
use tracing::trace;

use crate::config::LinkStatsConfig;
use crate::crsf::bridge::{HalfDuplexTransport, MicrosClock};
use crate::crsf::encoder::build_telemetry_frame;
use crate::crsf::protocol::*;
use crate::crsf::shared::SharedBridge;

/// RSSI reported for the second antenna of single-antenna receivers (-128)
pub const RSSI_NO_ANTENNA: u8 = 0x80;

/// RF mode reported in combined link statistics (50 Hz)
pub const RF_MODE_50HZ: u8 = 1;

/// Radio link statistics, in protocol units
pub trait LinkStatsSource {
    /// Uplink RSSI in -dBm
    fn uplink_rssi(&self) -> u8;
    /// Uplink RSSI scaled to 0-100%
    fn uplink_rssi_percent(&self) -> u8;
    /// Uplink link quality (0-100%)
    fn uplink_lq(&self) -> u8;
    /// Uplink SNR in dB
    fn uplink_snr(&self) -> i8;
    /// Downlink RSSI in -dBm
    fn downlink_rssi(&self) -> u8;
    /// Downlink RSSI scaled to 0-100%
    fn downlink_rssi_percent(&self) -> u8;
    /// Downlink link quality (0-100%)
    fn downlink_lq(&self) -> u8;
    /// Downlink SNR in dB
    fn downlink_snr(&self) -> i8;
    /// RF mode / packet rate code
    fn rf_mode(&self) -> u8;
    /// Transmit power of this side
    fn tx_power(&self) -> CrsfPower;
    /// Uplink frames per second / 10
    fn uplink_fps(&self) -> u8;
}

/// Combined uplink + downlink statistics
pub fn link_statistics(source: &impl LinkStatsSource) -> LinkStatistics {
    LinkStatistics {
        uplink_rssi_1: source.uplink_rssi(),
        uplink_rssi_2: RSSI_NO_ANTENNA,
        uplink_lq: source.uplink_lq(),
        uplink_snr: source.uplink_snr(),
        active_antenna: 0,
        rf_mode: source.rf_mode(),
        uplink_tx_power: source.tx_power().code(),
        downlink_rssi: source.downlink_rssi(),
        downlink_lq: source.downlink_lq(),
        downlink_snr: source.downlink_snr(),
    }
}

/// Uplink-only statistics
pub fn link_statistics_uplink(source: &impl LinkStatsSource) -> LinkStatisticsUplink {
    LinkStatisticsUplink {
        uplink_rssi: source.uplink_rssi(),
        uplink_rssi_percent: source.uplink_rssi_percent(),
        uplink_lq: source.uplink_lq(),
        uplink_snr: source.uplink_snr(),
        downlink_tx_power: source.tx_power().code(),
        uplink_fps: source.uplink_fps(),
    }
}

/// Downlink-only statistics
pub fn link_statistics_downlink(source: &impl LinkStatsSource) -> LinkStatisticsDownlink {
    LinkStatisticsDownlink {
        downlink_rssi: source.downlink_rssi(),
        downlink_rssi_percent: source.downlink_rssi_percent(),
        downlink_lq: source.downlink_lq(),
        downlink_snr: source.downlink_snr(),
        uplink_tx_power: source.tx_power().code(),
    }
}

fn enqueue_payload<T, C>(bridge: &SharedBridge<T, C>, address: u8, payload: LinkStatsPayload) -> bool
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    let frame = build_telemetry_frame(address, &payload);
    let queued = bridge.enqueue(frame);
    trace!(frame_type = payload.frame_type(), queued, "Link statistics");
    queued
}

/// Queue a combined link statistics frame
///
/// Returns `false` if a previous telemetry frame is still pending; the new
/// one is dropped in that case.
pub fn send_link_statistics<T, C>(
    bridge: &SharedBridge<T, C>,
    address: u8,
    source: &impl LinkStatsSource,
) -> bool
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    enqueue_payload(bridge, address, LinkStatsPayload::Combined(link_statistics(source)))
}

/// Queue an uplink-only link statistics frame
pub fn send_link_statistics_uplink<T, C>(
    bridge: &SharedBridge<T, C>,
    address: u8,
    source: &impl LinkStatsSource,
) -> bool
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    enqueue_payload(bridge, address, LinkStatsPayload::Uplink(link_statistics_uplink(source)))
}

/// Queue a downlink-only link statistics frame
pub fn send_link_statistics_downlink<T, C>(
    bridge: &SharedBridge<T, C>,
    address: u8,
    source: &impl LinkStatsSource,
) -> bool
where
    T: HalfDuplexTransport,
    C: MicrosClock,
{
    enqueue_payload(
        bridge,
        address,
        LinkStatsPayload::Downlink(link_statistics_downlink(source)),
    )
}

/// Which link statistics frames the periodic producer sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatsMode {
    Combined,
    Uplink,
    Downlink,
    /// Combined, uplink and downlink in turn
    Cycle,
}

/// Periodic link statistics producer
#[derive(Debug, Clone)]
pub struct LinkStatsProducer {
    mode: LinkStatsMode,
    address: u8,
    next: usize,
}

impl LinkStatsProducer {
    pub fn new(mode: LinkStatsMode, address: u8) -> Self {
        Self {
            mode,
            address,
            next: 0,
        }
    }

    /// Queue the next frame for this mode
    ///
    /// In cycle mode a dropped frame is retried on the next tick rather than
    /// skipped.
    pub fn tick<T, C>(&mut self, bridge: &SharedBridge<T, C>, source: &impl LinkStatsSource) -> bool
    where
        T: HalfDuplexTransport,
        C: MicrosClock,
    {
        let kind = match self.mode {
            LinkStatsMode::Cycle => [
                LinkStatsMode::Combined,
                LinkStatsMode::Uplink,
                LinkStatsMode::Downlink,
            ][self.next % 3],
            mode => mode,
        };

        let queued = match kind {
            LinkStatsMode::Uplink => send_link_statistics_uplink(bridge, self.address, source),
            LinkStatsMode::Downlink => send_link_statistics_downlink(bridge, self.address, source),
            _ => send_link_statistics(bridge, self.address, source),
        };

        if queued {
            self.next = self.next.wrapping_add(1);
        }
        queued
    }
}

/// Fixed statistics taken from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticLinkStats {
    config: LinkStatsConfig,
    tx_power: CrsfPower,
}

impl StaticLinkStats {
    /// Build from a validated configuration; unknown power levels report 0 mW
    pub fn from_config(config: &LinkStatsConfig) -> Self {
        Self {
            config: *config,
            tx_power: CrsfPower::from_milliwatts(config.tx_power_mw).unwrap_or(CrsfPower::Mw0),
        }
    }
}

impl LinkStatsSource for StaticLinkStats {
    fn uplink_rssi(&self) -> u8 {
        self.config.uplink_rssi
    }

    fn uplink_rssi_percent(&self) -> u8 {
        self.config.uplink_rssi_percent
    }

    fn uplink_lq(&self) -> u8 {
        self.config.uplink_lq
    }

    fn uplink_snr(&self) -> i8 {
        self.config.uplink_snr
    }

    fn downlink_rssi(&self) -> u8 {
        self.config.downlink_rssi
    }

    fn downlink_rssi_percent(&self) -> u8 {
        self.config.downlink_rssi_percent
    }

    fn downlink_lq(&self) -> u8 {
        self.config.downlink_lq
    }

    fn downlink_snr(&self) -> i8 {
        self.config.downlink_snr
    }

    fn rf_mode(&self) -> u8 {
        self.config.rf_mode
    }

    fn tx_power(&self) -> CrsfPower {
        self.tx_power
    }

    fn uplink_fps(&self) -> u8 {
        self.config.uplink_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::bridge::{BridgeSettings, CrsfBridge};
    use crate::crsf::decoder::{
        decode_frame, decode_link_statistics, decode_link_statistics_downlink,
        decode_link_statistics_uplink,
    };
    use crate::crsf::encoder::encode_rc_channels_frame;

    #[derive(Debug, Default)]
    struct VecTransport(Vec<u8>);

    impl HalfDuplexTransport for VecTransport {
        fn set_transmit_enabled(&mut self, _enabled: bool) {}

        fn queue_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    struct ZeroClock;

    impl MicrosClock for ZeroClock {
        fn now_us(&self) -> u16 {
            0
        }
    }

    fn shared() -> SharedBridge<VecTransport, ZeroClock> {
        SharedBridge::new(CrsfBridge::new(
            VecTransport::default(),
            ZeroClock,
            BridgeSettings::default(),
        ))
    }

    fn source() -> StaticLinkStats {
        StaticLinkStats::from_config(&LinkStatsConfig {
            uplink_rssi: 72,
            uplink_rssi_percent: 12,
            uplink_lq: 99,
            uplink_snr: 8,
            downlink_rssi: 68,
            downlink_rssi_percent: 13,
            downlink_lq: 97,
            downlink_snr: -3,
            rf_mode: RF_MODE_50HZ,
            tx_power_mw: 100,
            uplink_fps: 5,
        })
    }

    /// Run one handset frame through the bridge and return the reply bytes
    fn turnaround(bridge: &SharedBridge<VecTransport, ZeroClock>) -> Vec<u8> {
        let frame = encode_rc_channels_frame(CRSF_ADDRESS_MODULE, &[992u16; 16]);
        for &byte in frame.as_bytes() {
            bridge.on_byte_received(byte);
        }
        bridge.on_transmit_complete();
        bridge.with(|b| std::mem::take(&mut b.transport_mut().0))
    }

    #[test]
    fn test_combined_from_source() {
        let stats = link_statistics(&source());
        assert_eq!(stats.uplink_rssi_1, 72);
        assert_eq!(stats.uplink_rssi_2, RSSI_NO_ANTENNA);
        assert_eq!(stats.uplink_tx_power, CrsfPower::Mw100.code());
        assert_eq!(stats.downlink_snr, -3);
    }

    #[test]
    fn test_send_each_variant() {
        let bridge = shared();
        let source = source();

        assert!(send_link_statistics(&bridge, CRSF_ADDRESS_RADIO, &source));
        let reply = decode_frame(&turnaround(&bridge)).unwrap();
        assert_eq!(reply.address(), CRSF_ADDRESS_RADIO);
        assert_eq!(decode_link_statistics(reply.payload()).unwrap(), link_statistics(&source));

        assert!(send_link_statistics_uplink(&bridge, CRSF_ADDRESS_RADIO, &source));
        let reply = decode_frame(&turnaround(&bridge)).unwrap();
        assert_eq!(reply.frame_type(), CRSF_FRAMETYPE_LINK_STATISTICS_TX);
        assert_eq!(
            decode_link_statistics_uplink(reply.payload()).unwrap(),
            link_statistics_uplink(&source)
        );

        assert!(send_link_statistics_downlink(&bridge, CRSF_ADDRESS_RADIO, &source));
        let reply = decode_frame(&turnaround(&bridge)).unwrap();
        assert_eq!(reply.frame_type(), CRSF_FRAMETYPE_LINK_STATISTICS_RX);
        assert_eq!(
            decode_link_statistics_downlink(reply.payload()).unwrap(),
            link_statistics_downlink(&source)
        );
    }

    #[test]
    fn test_send_while_pending_keeps_first() {
        let bridge = shared();
        let source = source();

        assert!(send_link_statistics_downlink(&bridge, CRSF_ADDRESS_RADIO, &source));
        assert!(!send_link_statistics(&bridge, CRSF_ADDRESS_RADIO, &source));

        let reply = decode_frame(&turnaround(&bridge)).unwrap();
        assert_eq!(reply.frame_type(), CRSF_FRAMETYPE_LINK_STATISTICS_RX);
    }

    #[test]
    fn test_producer_cycles_variants() {
        let bridge = shared();
        let source = source();
        let mut producer = LinkStatsProducer::new(LinkStatsMode::Cycle, CRSF_ADDRESS_RADIO);

        let mut types = Vec::new();
        for _ in 0..4 {
            assert!(producer.tick(&bridge, &source));
            // second tick before the turnaround is dropped and retried
            assert!(!producer.tick(&bridge, &source));
            types.push(decode_frame(&turnaround(&bridge)).unwrap().frame_type());
        }

        assert_eq!(
            types,
            vec![
                CRSF_FRAMETYPE_LINK_STATISTICS,
                CRSF_FRAMETYPE_LINK_STATISTICS_TX,
                CRSF_FRAMETYPE_LINK_STATISTICS_RX,
                CRSF_FRAMETYPE_LINK_STATISTICS,
            ]
        );
    }

    #[test]
    fn test_producer_fixed_mode() {
        let bridge = shared();
        let mut producer = LinkStatsProducer::new(LinkStatsMode::Uplink, CRSF_ADDRESS_RADIO);

        assert!(producer.tick(&bridge, &source()));
        let reply = decode_frame(&turnaround(&bridge)).unwrap();
        assert_eq!(reply.frame_type(), CRSF_FRAMETYPE_LINK_STATISTICS_TX);
    }

    #[test]
    fn test_unknown_power_reports_zero() {
        let mut config = LinkStatsConfig::default();
        config.tx_power_mw = 42;
        let source = StaticLinkStats::from_config(&config);
        assert_eq!(source.tx_power(), CrsfPower::Mw0);
    }
}
