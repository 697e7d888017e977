//! Zenoh bridge for Modbus entities.
//!
//! This bridge polls Modbus sensors and switches (TCP, RTU or RTU over TCP)
//! and publishes their state to Zenoh. Switches accept commands.
//!
//! # Key Expressions
//!
//! ```text
//! modbus/<entity>/state          entity state (JSON)
//! modbus/<entity>/set            on/off commands for switches
//! modbus/@/write_register        raw register writes
//! modbus/@/write_coil            raw coil writes
//! modbus/@/status                bridge status
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod runner;
pub mod services;
pub mod session;
pub mod state;
pub mod status;

pub use error::{BridgeError, Result};
