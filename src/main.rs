//! # CRSF Bridge
//!
//! Half-duplex CRSF bridge on a host serial port.
//!
//! Receives CRSF frames from the handset, answers each one with queued link
//! statistics telemetry and passes RC channel data on to the channel sinks.

use std::sync::Arc;

use anyhow::Result;
use tokio::time::{interval, Duration};
use tracing::info;

use crsf_bridge::channels::LoggingSink;
use crsf_bridge::config::Config;
use crsf_bridge::crsf::bridge::CrsfBridge;
use crsf_bridge::crsf::shared::SharedBridge;
use crsf_bridge::serial::{run_bridge, BridgeSerial, BufferedTransport, InstantClock};
use crsf_bridge::telemetry::link_stats::{LinkStatsProducer, StaticLinkStats};
use crsf_bridge::telemetry::recorder::ChannelRecorder;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

type HostBridge = SharedBridge<BufferedTransport, InstantClock>;

/// Main entry point for the CRSF bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first argument, or `config/default.toml`)
///    - Open the serial port and build the shared bridge
///
/// 2. **Main Loop**
///    - Feed received bytes through the bridge, answering with telemetry
///    - Queue link statistics at the configured interval
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the telemetry producer
///    - Flush the channel recorder and log bridge counters
///
/// # Errors
///
/// Returns error if the configuration is invalid, the serial port cannot be
/// opened or the serial line fails.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("CRSF Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;
    info!("Configuration: {}", config_path);

    let mut serial = BridgeSerial::open(&config.serial.port, config.serial.baud_rate)?;
    info!("CRSF serial port opened at: {}", serial.device_path());

    let bridge: Arc<HostBridge> = Arc::new(SharedBridge::new(CrsfBridge::new(
        BufferedTransport::new(),
        InstantClock::new(),
        config.bridge_settings(),
    )));

    let producer = tokio::spawn(produce_link_stats(Arc::clone(&bridge), config.clone()));

    let mut sink = (
        LoggingSink::new(),
        ChannelRecorder::from_config(&config.telemetry)?,
    );

    info!(
        "Bridging on {} (module 0x{:02X}, telemetry to 0x{:02X} every {}ms)",
        serial.device_path(),
        config.crsf.module_address,
        config.crsf.radio_address,
        config.crsf.link_stats_interval_ms
    );
    info!("Press Ctrl+C to exit");

    tokio::select! {
        result = run_bridge(
            serial.stream_mut(),
            bridge.as_ref(),
            &mut sink,
            config.serial.read_buffer_size,
        ) => {
            result?;
        }

        // Handle Ctrl+C for graceful shutdown
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    producer.abort();

    if let Some(recorder) = sink.1.as_mut() {
        recorder.flush()?;
    }

    let stats = bridge.stats();
    info!(
        "Frames received: {}, telemetry sent: {}, dropped: {}, timeouts: {}, channel frames: {}",
        stats.frames_received,
        stats.frames_transmitted,
        stats.dropped_enqueues,
        stats.timeouts,
        sink.0.frames()
    );

    Ok(())
}

/// Queue link statistics on every tick of the configured interval
async fn produce_link_stats(bridge: Arc<HostBridge>, config: Config) {
    let source = StaticLinkStats::from_config(&config.link_stats);
    let mut producer = LinkStatsProducer::new(config.crsf.link_stats_mode, config.crsf.radio_address);
    let mut ticker = interval(Duration::from_millis(config.crsf.link_stats_interval_ms));

    loop {
        ticker.tick().await;
        producer.tick(bridge.as_ref(), &source);
    }
}
