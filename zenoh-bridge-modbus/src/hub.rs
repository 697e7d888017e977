//! Modbus hubs: shared tokio-modbus connections implementing [`Transport`].
//!
//! A hub owns at most one open context. It connects lazily on the first
//! request, serializes requests through a mutex and drops the context after
//! a transport failure so that the next request reconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use modbus_entities::{Transport, TransportError, TransportResult};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::error::Elapsed;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, HubConfig};

/// A named connection to one Modbus endpoint.
pub struct ModbusHub {
    name: String,
    connection: ConnectionConfig,
    unit_id: u8,
    timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl ModbusHub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            name: config.name.clone(),
            connection: config.connection.clone(),
            unit_id: config.unit_id,
            timeout: Duration::from_millis(config.timeout_ms),
            context: Mutex::new(None),
        }
    }

    /// Build all configured hubs, keyed by name.
    pub fn from_configs(configs: &[HubConfig]) -> HashMap<String, Arc<ModbusHub>> {
        configs
            .iter()
            .map(|config| (config.name.clone(), Arc::new(ModbusHub::new(config))))
            .collect()
    }

    /// Default unit id.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Lock the connection, opening it if needed, and address `unit`.
    async fn session(&self, unit: Option<u8>) -> TransportResult<MutexGuard<'_, Option<Context>>> {
        let mut guard = self.context.lock().await;

        let ctx = match guard.take() {
            Some(ctx) => ctx,
            None => self.connect().await?,
        };
        let ctx = guard.insert(ctx);
        ctx.set_slave(Slave(unit.unwrap_or(self.unit_id)));

        Ok(guard)
    }

    /// Map a request outcome, dropping the context on transport failures.
    fn finish<T>(
        &self,
        context: &mut Option<Context>,
        result: std::result::Result<tokio_modbus::Result<T>, Elapsed>,
    ) -> TransportResult<T> {
        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => Err(TransportError::Exception(format!("{:?}", code))),
            Ok(Err(e)) => {
                warn!(hub = %self.name, error = %e, "Modbus request failed, dropping connection");
                *context = None;
                Err(TransportError::Connection(e.to_string()))
            }
            Err(_) => {
                warn!(hub = %self.name, "Modbus request timed out, dropping connection");
                *context = None;
                Err(TransportError::Timeout)
            }
        }
    }

    /// Open a new context according to the connection settings.
    async fn connect(&self) -> TransportResult<Context> {
        let slave = Slave(self.unit_id);

        let ctx = match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| TransportError::Connection(format!("Invalid address: {}", e)))?
                    .next()
                    .ok_or_else(|| {
                        TransportError::Connection(format!("No address for {}:{}", host, port))
                    })?;

                tokio::time::timeout(self.timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| TransportError::Timeout)?
                    .map_err(|e| TransportError::Connection(e.to_string()))?
            }
            ConnectionConfig::RtuOverTcp { host, port } => {
                let stream = tokio::time::timeout(
                    self.timeout,
                    tokio::net::TcpStream::connect((host.as_str(), *port)),
                )
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Connection(e.to_string()))?;

                rtu::attach_slave(stream, slave)
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity.to_lowercase().as_str() {
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => tokio_serial::Parity::None,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits);

                let serial = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                    TransportError::Connection(format!("Serial open failed: {}", e))
                })?;

                rtu::attach_slave(serial, slave)
            }
        };

        info!(hub = %self.name, connection = ?self.connection, "Connected to Modbus hub");
        Ok(ctx)
    }
}

impl std::fmt::Debug for ModbusHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusHub")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .field("unit_id", &self.unit_id)
            .finish_non_exhaustive()
    }
}

/// Reject responses carrying fewer values than requested.
fn expect_len<T>(mut values: Vec<T>, count: u16) -> TransportResult<Vec<T>> {
    let expected = usize::from(count);
    if values.len() < expected {
        return Err(TransportError::ShortResponse {
            expected,
            got: values.len(),
        });
    }
    // Bit reads come back padded to whole bytes
    values.truncate(expected);
    Ok(values)
}

fn not_connected() -> TransportError {
    TransportError::Connection("not connected".to_string())
}

impl Transport for ModbusHub {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_holding_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result = tokio::time::timeout(self.timeout, ctx.read_holding_registers(address, count)).await;
        debug!(hub = %self.name, address, count, "read_holding_registers");
        expect_len(self.finish(&mut guard, result)?, count)
    }

    async fn read_input_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result = tokio::time::timeout(self.timeout, ctx.read_input_registers(address, count)).await;
        debug!(hub = %self.name, address, count, "read_input_registers");
        expect_len(self.finish(&mut guard, result)?, count)
    }

    async fn read_coils(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result = tokio::time::timeout(self.timeout, ctx.read_coils(address, count)).await;
        debug!(hub = %self.name, address, count, "read_coils");
        expect_len(self.finish(&mut guard, result)?, count)
    }

    async fn read_discrete_inputs(
        &self,
        unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result = tokio::time::timeout(self.timeout, ctx.read_discrete_inputs(address, count)).await;
        debug!(hub = %self.name, address, count, "read_discrete_inputs");
        expect_len(self.finish(&mut guard, result)?, count)
    }

    async fn write_coil(&self, unit: Option<u8>, address: u16, value: bool) -> TransportResult<()> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result = tokio::time::timeout(self.timeout, ctx.write_single_coil(address, value)).await;
        debug!(hub = %self.name, address, value, "write_coil");
        self.finish(&mut guard, result)
    }

    async fn write_register(
        &self,
        unit: Option<u8>,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result =
            tokio::time::timeout(self.timeout, ctx.write_single_register(address, value)).await;
        debug!(hub = %self.name, address, value, "write_register");
        self.finish(&mut guard, result)
    }

    async fn write_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        values: &[u16],
    ) -> TransportResult<()> {
        let mut guard = self.session(unit).await?;
        let ctx = guard.as_mut().ok_or_else(not_connected)?;
        let result =
            tokio::time::timeout(self.timeout, ctx.write_multiple_registers(address, values)).await;
        debug!(hub = %self.name, address, count = values.len(), "write_registers");
        self.finish(&mut guard, result)
    }
}
