//! Entity configuration.
//!
//! Entries deserialize from JSON5 and are turned into live entities by
//! [`EntitiesConfig::build`] once the hubs they reference exist.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binary_sensor::{BinarySensor, InputType};
use crate::decoder::{DataType, RegisterSpec};
use crate::error::ConfigError;
use crate::sensor::RegisterSensor;
use crate::switch::{CoilSwitch, RegisterSwitch, RegisterSwitchSpec};
use crate::transport::{RegisterKind, Transport};
use crate::value::Number;

/// Hub name used when an entry does not name one.
pub const DEFAULT_HUB: &str = "default";

/// All configured entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitiesConfig {
    /// Register sensors
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    /// Coil and discrete input sensors
    #[serde(default)]
    pub binary_sensors: Vec<BinarySensorConfig>,

    /// Coil and register switches
    #[serde(default)]
    pub switches: SwitchesConfig,
}

/// Switch entries, by form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchesConfig {
    #[serde(default)]
    pub coils: Vec<CoilSwitchConfig>,

    #[serde(default)]
    pub registers: Vec<RegisterSwitchConfig>,
}

/// A register sensor entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Entity name
    pub name: String,

    /// First register address (0-based)
    pub register: u16,

    /// Number of registers (default: 1)
    #[serde(default = "default_count")]
    pub count: u16,

    /// Value layout (default: int)
    #[serde(default)]
    pub data_type: DataType,

    /// Register bank (default: holding)
    #[serde(default)]
    pub register_type: RegisterKind,

    /// Reverse word order before decoding
    #[serde(default)]
    pub reverse_order: bool,

    /// Scaling factor (default: 1)
    #[serde(default = "default_scale")]
    pub scale: Number,

    /// Offset added after scaling (default: 0)
    #[serde(default)]
    pub offset: Number,

    /// Decimal digits (default: 0)
    #[serde(default)]
    pub precision: u32,

    /// Packing descriptor, required for `custom`
    #[serde(default)]
    pub structure: Option<String>,

    /// 1-based bit to extract, counted from the least significant bit
    #[serde(default)]
    pub bit: Option<u16>,

    /// Unit of measurement (for metadata)
    #[serde(default)]
    pub unit_of_measurement: Option<String>,

    /// Device class (for metadata)
    #[serde(default)]
    pub device_class: Option<String>,

    /// Modbus unit id, hub default when unset
    #[serde(default)]
    pub slave: Option<u8>,

    /// Hub name (default: "default")
    #[serde(default = "default_hub")]
    pub hub: String,
}

/// A coil or discrete input sensor entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySensorConfig {
    pub name: String,

    /// Coil or discrete input address (0-based)
    pub address: u16,

    /// Bank to read (default: coil)
    #[serde(default)]
    pub input_type: InputType,

    #[serde(default)]
    pub device_class: Option<String>,

    #[serde(default)]
    pub slave: Option<u8>,

    #[serde(default = "default_hub")]
    pub hub: String,
}

/// A coil switch entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoilSwitchConfig {
    pub name: String,

    /// Coil address (0-based)
    pub coil: u16,

    #[serde(default)]
    pub slave: Option<u8>,

    #[serde(default = "default_hub")]
    pub hub: String,
}

/// A bit-addressed register switch entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSwitchConfig {
    pub name: String,

    /// Command bit address, e.g. "%MX401.5"
    pub register: String,

    /// Status bit address, e.g. "%QX4.5"
    pub state: String,

    /// Register bank (default: holding, the only writable one)
    #[serde(default)]
    pub register_type: RegisterKind,

    /// Status register override
    #[serde(default)]
    pub verify_register: Option<u16>,

    /// Read the status back after commands (default: true)
    #[serde(default = "default_verify_state")]
    pub verify_state: bool,

    /// Whole-word ON pattern
    #[serde(default)]
    pub state_on: Option<u16>,

    /// Whole-word OFF pattern
    #[serde(default)]
    pub state_off: Option<u16>,

    /// Wait before verifying, in milliseconds (default: 1000)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub slave: Option<u8>,

    #[serde(default = "default_hub")]
    pub hub: String,
}

fn default_count() -> u16 {
    1
}

fn default_scale() -> Number {
    Number::Int(1)
}

fn default_hub() -> String {
    DEFAULT_HUB.to_string()
}

fn default_verify_state() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl SensorConfig {
    /// Build the decoding spec, validating the layout.
    pub fn to_spec(&self) -> Result<RegisterSpec, ConfigError> {
        let mut builder = RegisterSpec::builder(&self.name, self.register)
            .count(self.count)
            .kind(self.register_type)
            .reverse_order(self.reverse_order)
            .data_type(self.data_type)
            .bit(self.bit)
            .scale(self.scale)
            .offset(self.offset)
            .precision(self.precision);
        if let Some(structure) = &self.structure {
            builder = builder.structure(structure);
        }
        builder.build()
    }
}

impl RegisterSwitchConfig {
    /// Parse the bit-address tokens into a switch spec.
    pub fn to_spec(&self) -> Result<RegisterSwitchSpec, ConfigError> {
        Ok(
            RegisterSwitchSpec::from_tokens(&self.name, &self.register, &self.state)?
                .with_kind(self.register_type)
                .with_unit(self.slave)
                .with_verify_register(self.verify_register)
                .with_verify_state(self.verify_state)
                .with_patterns(self.state_on, self.state_off)
                .with_settle_delay(Duration::from_millis(self.settle_delay_ms)),
        )
    }
}

/// Entities built from an [`EntitiesConfig`].
#[derive(Debug)]
pub struct Entities<T> {
    pub sensors: Vec<RegisterSensor<T>>,
    pub binary_sensors: Vec<BinarySensor<T>>,
    pub coil_switches: Vec<CoilSwitch<T>>,
    pub register_switches: Vec<RegisterSwitch<T>>,
}

impl<T> Entities<T> {
    pub fn len(&self) -> usize {
        self.sensors.len()
            + self.binary_sensors.len()
            + self.coil_switches.len()
            + self.register_switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntitiesConfig {
    /// Parse and validate a JSON5 document holding the entity lists.
    pub fn from_json5(content: &str) -> Result<Self, ConfigError> {
        let config: EntitiesConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of configured entities.
    pub fn len(&self) -> usize {
        self.sensors.len()
            + self.binary_sensors.len()
            + self.switches.coils.len()
            + self.switches.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(entity, hub)` pair referenced by the configuration.
    pub fn hub_refs(&self) -> Vec<(&str, &str)> {
        let sensors = self.sensors.iter().map(|s| (s.name.as_str(), s.hub.as_str()));
        let binary = self
            .binary_sensors
            .iter()
            .map(|s| (s.name.as_str(), s.hub.as_str()));
        let coils = self
            .switches
            .coils
            .iter()
            .map(|s| (s.name.as_str(), s.hub.as_str()));
        let registers = self
            .switches
            .registers
            .iter()
            .map(|s| (s.name.as_str(), s.hub.as_str()));

        sensors.chain(binary).chain(coils).chain(registers).collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::validation(
                "At least one entity must be configured",
            ));
        }

        let mut names = HashSet::new();
        for (name, _) in self.hub_refs() {
            if name.is_empty() {
                return Err(ConfigError::validation("Entity name cannot be empty"));
            }
            if !names.insert(name) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate entity name '{}'",
                    name
                )));
            }
        }

        for sensor in &self.sensors {
            if sensor.count == 0 {
                return Err(ConfigError::Validation(format!(
                    "Sensor '{}': count must be at least 1",
                    sensor.name
                )));
            }
        }

        Ok(())
    }

    /// Build entities against the given hubs.
    ///
    /// A sensor with an invalid layout is logged and skipped. A malformed
    /// switch address or an unknown hub fails the whole build.
    pub fn build<T: Transport>(
        &self,
        hubs: &HashMap<String, Arc<T>>,
    ) -> Result<Entities<T>, ConfigError> {
        let hub = |entity: &str, name: &str| {
            hubs.get(name).cloned().ok_or_else(|| ConfigError::UnknownHub {
                entity: entity.to_string(),
                hub: name.to_string(),
            })
        };

        let mut sensors = Vec::with_capacity(self.sensors.len());
        for entry in &self.sensors {
            let transport = hub(&entry.name, &entry.hub)?;
            let spec = match entry.to_spec() {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::error!(entity = %entry.name, error = %e, "Skipping sensor");
                    continue;
                }
            };
            sensors.push(
                RegisterSensor::new(transport, spec)
                    .with_unit(entry.slave)
                    .with_unit_of_measurement(entry.unit_of_measurement.clone())
                    .with_device_class(entry.device_class.clone()),
            );
        }

        let binary_sensors = self
            .binary_sensors
            .iter()
            .map(|entry| {
                Ok(
                    BinarySensor::new(
                        hub(&entry.name, &entry.hub)?,
                        &entry.name,
                        entry.address,
                        entry.input_type,
                    )
                    .with_unit(entry.slave)
                    .with_device_class(entry.device_class.clone()),
                )
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let coil_switches = self
            .switches
            .coils
            .iter()
            .map(|entry| {
                Ok(
                    CoilSwitch::new(hub(&entry.name, &entry.hub)?, &entry.name, entry.coil)
                        .with_unit(entry.slave),
                )
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let register_switches = self
            .switches
            .registers
            .iter()
            .map(|entry| Ok(RegisterSwitch::new(hub(&entry.name, &entry.hub)?, entry.to_spec()?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let entities = Entities {
            sensors,
            binary_sensors,
            coil_switches,
            register_switches,
        };
        tracing::debug!(
            configured = self.len(),
            built = entities.len(),
            "Entities built"
        );
        Ok(entities)
    }
}
