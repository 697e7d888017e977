//! Modbus Entities
//!
//! Maps Modbus registers and coils to entities with cached state, availability
//! and formatting semantics:
//!
//! - [`transport`] - The transport capability entities talk through
//! - [`structure`] - Packing descriptors (`>f`, `>2h`, `4s`, ...)
//! - [`decoder`] - Register words to typed, scaled and formatted values
//! - [`sensor`] - Register sensors
//! - [`binary_sensor`] - Coil and discrete input sensors
//! - [`switch`] - Coil switches and bit-addressed register switches
//! - [`restore`] - Last-known state persistence
//! - [`config`] - JSON5 entity configuration and entity construction
//! - [`testing`] - In-memory transport for tests
//! - [`error`] - Error types

pub mod binary_sensor;
pub mod config;
pub mod decoder;
pub mod entity;
pub mod error;
pub mod restore;
pub mod sensor;
pub mod structure;
pub mod switch;
pub mod testing;
pub mod transport;
pub mod value;

// Re-export commonly used types at the crate root
pub use binary_sensor::{BinarySensor, InputType};
pub use config::{
    BinarySensorConfig, CoilSwitchConfig, Entities, EntitiesConfig, RegisterSwitchConfig,
    SensorConfig, SwitchesConfig,
};
pub use decoder::{DataType, RegisterSpec, RegisterSpecBuilder, decode};
pub use entity::{Availability, Entity, Switch};
pub use error::{ConfigError, DecodeError, StoreError, TransportError};
pub use restore::{
    JsonFileStore, MemoryStore, RestoreState, StateStore, StoredState, persist_entity,
    restore_entity, save_if_changed,
};
pub use sensor::RegisterSensor;
pub use structure::{ByteOrder, Field, Structure};
pub use switch::{
    BitAddress, CoilSwitch, RegisterSwitch, RegisterSwitchSpec, SwitchCommand, SwitchState,
    VerifyOutcome,
};
pub use transport::{RegisterKind, Transport, TransportResult};
pub use value::{DecodedValue, Number, Numeric, Scalar};
