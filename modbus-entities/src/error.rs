use thiserror::Error;

/// Errors detected while building entities from configuration.
///
/// These never reach run time: an entity that fails here is either skipped
/// or aborts the whole load.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Error in '{name}' structure: {reason}")]
    Structure { name: String, reason: String },

    #[error("'{name}': structure size ({size} bytes) mismatch registers count ({count} words)")]
    SizeMismatch { name: String, size: usize, count: u16 },

    #[error("'{name}': unable to detect {data_type} layout for {count} words, try a custom type")]
    UnsupportedCount {
        name: String,
        data_type: String,
        count: u16,
    },

    #[error("'{name}': bit index {bit} outside of the {bits} bits read")]
    BitIndex { name: String, bit: u16, bits: usize },

    #[error("'{name}': invalid bit address '{token}', expected a form like %MX400.3")]
    Token { name: String, token: String },

    #[error("'{name}': bit address '{token}' out of range: {reason}")]
    TokenRange {
        name: String,
        token: String,
        reason: String,
    },

    #[error("'{entity}': unknown hub '{hub}'")]
    UnknownHub { entity: String, hub: String },
}

impl ConfigError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Connectivity or protocol failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Modbus exception: {0}")]
    Exception(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Short response: expected {expected} values, got {got}")]
    ShortResponse { expected: usize, got: usize },
}

/// Errors turning register words into a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Expected {expected} registers, got {got}")]
    WordCount { expected: usize, got: usize },

    #[error("Register text is not valid UTF-8: {0}")]
    Text(#[from] std::str::Utf8Error),
}

/// Errors persisting entity state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
