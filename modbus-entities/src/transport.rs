//! The transport capability entities read and write through.
//!
//! Connection management, locking across entities and wire-level retries
//! belong to the implementor. Every call is a single round trip that either
//! yields data or a [`TransportError`].

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use crate::error::TransportError;

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// The 16-bit register bank a value lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Holding registers (read/write).
    #[default]
    Holding,
    /// Input registers (read-only).
    Input,
}

impl RegisterKind {
    /// Return the string name for this register kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterKind::Holding => "holding",
            RegisterKind::Input => "input",
        }
    }

    /// Whether values of this kind can be written.
    pub fn is_writable(&self) -> bool {
        matches!(self, RegisterKind::Holding)
    }
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access to one Modbus endpoint.
///
/// `unit` selects the slave id; `None` means the transport's default unit.
pub trait Transport: Send + Sync + 'static {
    /// Name of the hub, used in diagnostics.
    fn name(&self) -> &str;

    fn read_holding_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> impl Future<Output = TransportResult<Vec<u16>>> + Send;

    fn read_input_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> impl Future<Output = TransportResult<Vec<u16>>> + Send;

    fn read_coils(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> impl Future<Output = TransportResult<Vec<bool>>> + Send;

    fn read_discrete_inputs(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> impl Future<Output = TransportResult<Vec<bool>>> + Send;

    fn write_coil(
        &self,
        unit: Option<u8>,
        address: u16,
        value: bool,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    fn write_register(
        &self,
        unit: Option<u8>,
        address: u16,
        value: u16,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    fn write_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        values: &[u16],
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Read `count` words from the bank selected by `kind`.
    fn read_registers(
        &self,
        kind: RegisterKind,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> impl Future<Output = TransportResult<Vec<u16>>> + Send {
        async move {
            match kind {
                RegisterKind::Holding => self.read_holding_registers(unit, address, count).await,
                RegisterKind::Input => self.read_input_registers(unit, address, count).await,
            }
        }
    }
}
