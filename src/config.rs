//! # Gateway Configuration
//!
//! JSON configuration file, loaded with `serde_json`. Every field except
//! names, ports and addresses has a default, so a minimal file is short:
//!
//! ```json
//! {
//!   "channels": [{ "name": "grid", "port": "/dev/ttyUSB0" }],
//!   "bus": { "port": "/dev/ttyUSB1", "baudrate": 9600 },
//!   "slaves": [{ "name": "sdm", "address": 1, "interval_secs": 30 }]
//! }
//! ```
//!
//! `Config::validate` rejects settings the state machines cannot honour; the
//! conversion methods then hand the core its read-only records.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::SerialBusConfig;
use crate::channel::{ChannelConfig, Framing};
use crate::constants::{
    DEFAULT_BUFFER_CAPACITY, MODBUS_MAX_READ_REGISTERS, MODBUS_MAX_SLAVE_ADDRESS,
    MODBUS_MIN_SLAVE_ADDRESS, MODBUS_READ_INPUT_REGISTERS,
};
use crate::error::GatewayError;
use crate::poll::{PollConfig, RegisterBlock, RegisterDef, RegisterLayout, SlaveConfig};
use crate::transport::TransportConfig;

fn default_loglevel() -> String {
    "info".to_string()
}
fn default_tick_ms() -> u64 {
    5
}
fn default_status_interval_secs() -> u32 {
    300
}
fn default_baudrate() -> u32 {
    9600
}
fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
fn default_inter_frame_gap_ms() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_stop_bits() -> u8 {
    1
}
fn default_transmit_delay_ms() -> u32 {
    2
}
fn default_response_timeout_ms() -> u32 {
    500
}
fn default_identity_retry_ms() -> u32 {
    1000
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    /// Control loop period.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Status snapshot period in the log; 0 disables it.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u32,
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
    #[serde(default)]
    pub bus: Option<BusSettings>,
    #[serde(default)]
    pub slaves: Vec<SlaveSettings>,
    #[serde(default)]
    pub publisher: PublisherSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub throttle_secs: u32,
    #[serde(default = "default_inter_frame_gap_ms")]
    pub inter_frame_gap_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParitySetting {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSettings {
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default)]
    pub parity: ParitySetting,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_transmit_delay_ms")]
    pub transmit_delay_ms: u32,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u32,
    /// Wait before repeating a failed serial number request.
    #[serde(default = "default_identity_retry_ms")]
    pub identity_retry_ms: u32,
    #[serde(default = "default_true")]
    pub rts_direction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSettings {
    #[default]
    Sdm630,
    Custom {
        registers: Vec<RegisterDef>,
        blocks: Vec<RegisterBlock>,
    },
}

impl LayoutSettings {
    pub fn to_layout(&self) -> RegisterLayout {
        match self {
            LayoutSettings::Sdm630 => RegisterLayout::sdm630(),
            LayoutSettings::Custom { registers, blocks } => RegisterLayout {
                registers: registers.clone(),
                blocks: blocks.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveSettings {
    pub name: String,
    pub address: u8,
    /// 0 disables polling.
    #[serde(default)]
    pub interval_secs: u32,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default = "default_true")]
    pub discover_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublisherSettings {
    #[default]
    Log,
    JsonLines {
        path: String,
    },
}

impl Config {
    /// Reads, parses and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, GatewayError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Config::from_json(&text)?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Config, GatewayError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.tick_ms == 0 {
            return Err(GatewayError::Config("tick_ms must be positive".into()));
        }

        let mut names = HashSet::new();
        for ch in &self.channels {
            if !names.insert(ch.name.as_str()) {
                return Err(GatewayError::Config(format!("duplicate channel name '{}'", ch.name)));
            }
            let min = ch.framing.min_frame_len();
            if ch.buffer_capacity < min {
                return Err(GatewayError::Config(format!(
                    "channel '{}': buffer_capacity {} below minimum frame length {}",
                    ch.name, ch.buffer_capacity, min
                )));
            }
            if ch.baudrate == 0 {
                return Err(GatewayError::Config(format!("channel '{}': baudrate is 0", ch.name)));
            }
        }

        if let Some(bus) = &self.bus {
            if bus.baudrate == 0 {
                return Err(GatewayError::Config("bus baudrate is 0".into()));
            }
            if !matches!(bus.stop_bits, 1 | 2) {
                return Err(GatewayError::Config(format!("bus stop_bits {} not 1 or 2", bus.stop_bits)));
            }
        } else if self.slaves.iter().any(|s| s.interval_secs > 0) {
            return Err(GatewayError::Config("slaves configured without a bus".into()));
        }

        let mut names = HashSet::new();
        for slave in &self.slaves {
            if !names.insert(slave.name.as_str()) {
                return Err(GatewayError::Config(format!("duplicate slave name '{}'", slave.name)));
            }
            if !(MODBUS_MIN_SLAVE_ADDRESS..=MODBUS_MAX_SLAVE_ADDRESS).contains(&slave.address) {
                return Err(GatewayError::Config(format!(
                    "slave '{}': address {} outside 1..=247",
                    slave.name, slave.address
                )));
            }
            if slave.interval_secs > u32::MAX / 2 / 1000 {
                return Err(GatewayError::Config(format!("slave '{}': interval too long", slave.name)));
            }
            validate_layout(&slave.name, &slave.layout.to_layout())?;
        }

        Ok(())
    }

    /// Channel records for the enabled channels, with their transports.
    pub fn channel_configs(&self) -> Vec<(ChannelConfig, TransportConfig)> {
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| {
                (
                    ChannelConfig {
                        name: c.name.clone(),
                        framing: c.framing.clone(),
                        capacity: c.buffer_capacity,
                        throttle_ms: c.throttle_secs.saturating_mul(1000),
                    },
                    TransportConfig {
                        port: c.port.clone(),
                        baudrate: c.baudrate,
                        inter_frame_gap: Duration::from_millis(c.inter_frame_gap_ms),
                    },
                )
            })
            .collect()
    }

    pub fn poll_config(&self) -> PollConfig {
        let mut poll = PollConfig {
            function: MODBUS_READ_INPUT_REGISTERS,
            ..PollConfig::default()
        };
        if let Some(bus) = &self.bus {
            poll.transmit_delay_ms = bus.transmit_delay_ms;
            poll.response_timeout_ms = bus.response_timeout_ms;
            poll.identity_retry_ms = bus.identity_retry_ms;
        }
        poll
    }

    pub fn bus_config(&self) -> Option<SerialBusConfig> {
        self.bus.as_ref().map(|bus| SerialBusConfig {
            port: bus.port.clone(),
            baudrate: bus.baudrate,
            parity: match bus.parity {
                ParitySetting::None => tokio_serial::Parity::None,
                ParitySetting::Even => tokio_serial::Parity::Even,
                ParitySetting::Odd => tokio_serial::Parity::Odd,
            },
            stop_bits: if bus.stop_bits == 2 {
                tokio_serial::StopBits::Two
            } else {
                tokio_serial::StopBits::One
            },
            rts_direction: bus.rts_direction,
        })
    }

    /// Slave records; the SDM630 layout is shared between slaves using it.
    pub fn slave_configs(&self) -> Vec<SlaveConfig> {
        let sdm630 = Arc::new(RegisterLayout::sdm630());
        self.slaves
            .iter()
            .map(|s| {
                let layout = match &s.layout {
                    LayoutSettings::Sdm630 => Arc::clone(&sdm630),
                    custom => Arc::new(custom.to_layout()),
                };
                SlaveConfig {
                    name: s.name.clone(),
                    address: s.address,
                    interval_ms: s.interval_secs * 1000,
                    layout,
                    discover_identity: s.discover_identity,
                }
            })
            .collect()
    }
}

fn validate_layout(slave: &str, layout: &RegisterLayout) -> Result<(), GatewayError> {
    if layout.registers.is_empty() || layout.blocks.is_empty() {
        return Err(GatewayError::Config(format!("slave '{slave}': empty register layout")));
    }
    for block in &layout.blocks {
        let count = block.register_count();
        if count > MODBUS_MAX_READ_REGISTERS {
            return Err(GatewayError::Config(format!(
                "slave '{slave}': block at 0x{:04X} reads {count} registers, limit {MODBUS_MAX_READ_REGISTERS}",
                block.start
            )));
        }
        if !block.float_addresses().any(|a| layout.find(a).is_some()) {
            return Err(GatewayError::Config(format!(
                "slave '{slave}': block at 0x{:04X} reads no named register",
                block.start
            )));
        }
    }
    Ok(())
}
