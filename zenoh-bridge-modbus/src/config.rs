//! Configuration for the Modbus bridge.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use modbus_entities::{ConfigError, EntitiesConfig};
use serde::{Deserialize, Serialize};

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Modbus hubs and entities
    pub modbus: ModbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Modbus section: hubs plus the entities polled through them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Key expression prefix (default: "modbus")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Seconds between two updates of an entity
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// File holding last-known entity states, restored on startup
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Modbus endpoints
    pub hubs: Vec<HubConfig>,

    /// Sensors, binary sensors and switches
    #[serde(flatten)]
    pub entities: EntitiesConfig,
}

fn default_key_prefix() -> String {
    "modbus".to_string()
}

fn default_scan_interval() -> u64 {
    15
}

/// A named Modbus endpoint shared by entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub name referenced by entities (default: "default")
    #[serde(default = "default_hub_name")]
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Unit id used when an entity does not set `slave` (default: 1)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_hub_name() -> String {
    modbus_entities::config::DEFAULT_HUB.to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    3000
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// RTU framing over a TCP stream (serial gateways)
    RtuOverTcp {
        host: String,
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl ModbusBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ModbusBridgeConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let modbus = &self.modbus;

        if modbus.hubs.is_empty() {
            return Err(ConfigError::validation(
                "At least one hub must be configured",
            ));
        }

        if modbus.scan_interval_secs == 0 {
            return Err(ConfigError::validation(
                "scan_interval_secs must be at least 1",
            ));
        }

        let mut hub_names = HashSet::new();
        for hub in &modbus.hubs {
            if hub.name.is_empty() {
                return Err(ConfigError::validation("Hub name cannot be empty"));
            }

            if !hub_names.insert(hub.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate hub name '{}'",
                    hub.name
                )));
            }

            // Validate RTU parity
            if let ConnectionConfig::Rtu { parity, .. } = &hub.connection {
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "Hub '{}': invalid parity '{}' (use none, even, or odd)",
                            hub.name, parity
                        )));
                    }
                }
            }
        }

        modbus.entities.validate()?;

        for (entity, hub) in modbus.entities.hub_refs() {
            if !hub_names.contains(hub) {
                return Err(ConfigError::UnknownHub {
                    entity: entity.to_string(),
                    hub: hub.to_string(),
                });
            }
        }

        Ok(())
    }
}
