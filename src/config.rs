//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::crsf::bridge::BridgeSettings;
use crate::crsf::protocol::{CrsfPower, CRSF_ADDRESS_MODULE, CRSF_ADDRESS_RADIO};
use crate::error::{BridgeError, Result};
use crate::telemetry::link_stats::LinkStatsMode;

/// Baud rates accepted for the CRSF line
pub const SUPPORTED_BAUD_RATES: &[u32] = &[115_200, 400_000, 416_666, 420_000, 921_600, 1_870_000];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub crsf: CrsfConfig,
    #[serde(default)]
    pub link_stats: LinkStatsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Bytes requested from the port per read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

/// CRSF protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CrsfConfig {
    /// Address of inbound frames this bridge accepts
    #[serde(default = "default_module_address")]
    pub module_address: u8,

    /// Address stamped on outbound telemetry
    #[serde(default = "default_radio_address")]
    pub radio_address: u8,

    #[serde(default = "default_inactivity_timeout_us")]
    pub inactivity_timeout_us: u16,

    #[serde(default = "default_link_stats_interval_ms")]
    pub link_stats_interval_ms: u64,

    #[serde(default = "default_link_stats_mode")]
    pub link_stats_mode: LinkStatsMode,
}

/// Static link statistics reported by the host
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LinkStatsConfig {
    /// Uplink RSSI in -dBm
    pub uplink_rssi: u8,
    pub uplink_rssi_percent: u8,
    pub uplink_lq: u8,
    pub uplink_snr: i8,
    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,
    pub downlink_rssi_percent: u8,
    pub downlink_lq: u8,
    pub downlink_snr: i8,
    pub rf_mode: u8,
    /// Transmit power in mW; must be one of the CRSF power levels
    pub tx_power_mw: u16,
    /// Uplink frames per second / 10
    pub uplink_fps: u8,
}

impl Default for LinkStatsConfig {
    fn default() -> Self {
        Self {
            uplink_rssi: 70,
            uplink_rssi_percent: 50,
            uplink_lq: 100,
            uplink_snr: 10,
            downlink_rssi: 70,
            downlink_rssi_percent: 50,
            downlink_lq: 100,
            downlink_snr: 10,
            rf_mode: 1,
            tx_power_mw: 100,
            uplink_fps: 5,
        }
    }
}

/// Channel recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 416_666 }
fn default_read_buffer_size() -> usize { 256 }

fn default_module_address() -> u8 { CRSF_ADDRESS_MODULE }
fn default_radio_address() -> u8 { CRSF_ADDRESS_RADIO }
fn default_inactivity_timeout_us() -> u16 { 500 }
fn default_link_stats_interval_ms() -> u64 { 100 }
fn default_link_stats_mode() -> LinkStatsMode { LinkStatsMode::Combined }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Default for CrsfConfig {
    fn default() -> Self {
        Self {
            module_address: default_module_address(),
            radio_address: default_radio_address(),
            inactivity_timeout_us: default_inactivity_timeout_us(),
            link_stats_interval_ms: default_link_stats_interval_ms(),
            link_stats_mode: default_link_stats_mode(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            format: default_log_format(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from `path`, or use the defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// State machine settings derived from the `[crsf]` section
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            module_address: self.crsf.module_address,
            inactivity_timeout_us: self.crsf.inactivity_timeout_us,
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                SUPPORTED_BAUD_RATES
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if self.serial.read_buffer_size == 0 || self.serial.read_buffer_size > 4096 {
            return Err(invalid("read_buffer_size must be between 1 and 4096"));
        }

        // CRSF
        if !(50..=5000).contains(&self.crsf.inactivity_timeout_us) {
            return Err(invalid("inactivity_timeout_us must be between 50 and 5000"));
        }

        if self.crsf.link_stats_interval_ms == 0 || self.crsf.link_stats_interval_ms > 60000 {
            return Err(invalid("link_stats_interval_ms must be between 1 and 60000"));
        }

        if self.crsf.module_address == self.crsf.radio_address {
            return Err(invalid("module_address and radio_address must differ"));
        }

        // Link statistics
        for (name, value) in [
            ("uplink_lq", self.link_stats.uplink_lq),
            ("uplink_rssi_percent", self.link_stats.uplink_rssi_percent),
            ("downlink_lq", self.link_stats.downlink_lq),
            ("downlink_rssi_percent", self.link_stats.downlink_rssi_percent),
        ] {
            if value > 100 {
                return Err(invalid(format!("{} must be between 0 and 100", name)));
            }
        }

        if CrsfPower::from_milliwatts(self.link_stats.tx_power_mw).is_none() {
            return Err(invalid(
                "tx_power_mw must be one of: 0, 10, 25, 50, 100, 250, 500, 1000, 2000",
            ));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        Ok(())
    }
}
