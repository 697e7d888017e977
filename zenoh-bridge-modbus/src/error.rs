//! Error types for the Modbus bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Zenoh session error.
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Request addressed to a hub that does not exist or failed.
    #[error("Hub '{hub}': {message}")]
    Hub { hub: String, message: String },

    /// State file error.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<modbus_entities::ConfigError> for BridgeError {
    fn from(e: modbus_entities::ConfigError) -> Self {
        BridgeError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

impl From<modbus_entities::StoreError> for BridgeError {
    fn from(e: modbus_entities::StoreError) -> Self {
        BridgeError::Persistence(e.to_string())
    }
}
