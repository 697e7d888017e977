//! Testing utilities.
//!
//! Provides an in-memory [`Transport`] holding register and coil banks, with
//! failure injection and a log of every write.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::transport::{Transport, TransportResult};

/// A write received by a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockWrite {
    Coil {
        unit: Option<u8>,
        address: u16,
        value: bool,
    },
    Register {
        unit: Option<u8>,
        address: u16,
        value: u16,
    },
    Registers {
        unit: Option<u8>,
        address: u16,
        values: Vec<u16>,
    },
}

#[derive(Debug, Default)]
struct MockData {
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    failure: Option<TransportError>,
    writes: Vec<MockWrite>,
    reads: usize,
}

/// In-memory transport.
///
/// Reading an address that was never set answers with an "illegal data
/// address" exception, like a real device would.
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    data: Mutex<MockData>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(MockData::default()),
        }
    }

    pub fn set_holding(&self, address: u16, value: u16) {
        self.data.lock().holding_registers.insert(address, value);
    }

    /// Set consecutive holding registers starting at `address`.
    pub fn set_holding_words(&self, address: u16, values: &[u16]) {
        let mut data = self.data.lock();
        for (addr, value) in (address..).zip(values) {
            data.holding_registers.insert(addr, *value);
        }
    }

    pub fn set_input(&self, address: u16, value: u16) {
        self.data.lock().input_registers.insert(address, value);
    }

    pub fn set_coil(&self, address: u16, value: bool) {
        self.data.lock().coils.insert(address, value);
    }

    pub fn set_discrete_input(&self, address: u16, value: bool) {
        self.data.lock().discrete_inputs.insert(address, value);
    }

    pub fn holding(&self, address: u16) -> Option<u16> {
        self.data.lock().holding_registers.get(&address).copied()
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.data.lock().coils.get(&address).copied()
    }

    /// Make every following call fail with `error`, or succeed again with `None`.
    pub fn fail_with(&self, error: Option<TransportError>) {
        self.data.lock().failure = error;
    }

    /// Shorthand for failing every call with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.fail_with(offline.then(|| TransportError::Connection("device offline".to_string())));
    }

    /// Writes received so far, oldest first.
    pub fn writes(&self) -> Vec<MockWrite> {
        self.data.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.data.lock().writes.clear();
    }

    /// Number of read calls received.
    pub fn reads(&self) -> usize {
        self.data.lock().reads
    }

    fn read<T: Copy>(
        &self,
        bank: impl Fn(&MockData) -> &HashMap<u16, T>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<T>> {
        let mut data = self.data.lock();
        data.reads += 1;
        if let Some(err) = &data.failure {
            return Err(err.clone());
        }

        let bank = bank(&data);
        (address..address.saturating_add(count))
            .map(|addr| {
                bank.get(&addr)
                    .copied()
                    .ok_or_else(|| TransportError::Exception("illegal data address".to_string()))
            })
            .collect()
    }

    fn write(&self, write: MockWrite) -> TransportResult<()> {
        let mut data = self.data.lock();
        if let Some(err) = &data.failure {
            return Err(err.clone());
        }

        match &write {
            MockWrite::Coil { address, value, .. } => {
                data.coils.insert(*address, *value);
            }
            MockWrite::Register { address, value, .. } => {
                data.holding_registers.insert(*address, *value);
            }
            MockWrite::Registers {
                address, values, ..
            } => {
                for (addr, value) in (*address..).zip(values) {
                    data.holding_registers.insert(addr, *value);
                }
            }
        }
        data.writes.push(write);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_holding_registers(
        &self,
        _unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.read(|d| &d.holding_registers, address, count)
    }

    async fn read_input_registers(
        &self,
        _unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        self.read(|d| &d.input_registers, address, count)
    }

    async fn read_coils(
        &self,
        _unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        self.read(|d| &d.coils, address, count)
    }

    async fn read_discrete_inputs(
        &self,
        _unit: Option<u8>,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<bool>> {
        self.read(|d| &d.discrete_inputs, address, count)
    }

    async fn write_coil(&self, unit: Option<u8>, address: u16, value: bool) -> TransportResult<()> {
        self.write(MockWrite::Coil {
            unit,
            address,
            value,
        })
    }

    async fn write_register(
        &self,
        unit: Option<u8>,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        self.write(MockWrite::Register {
            unit,
            address,
            value,
        })
    }

    async fn write_registers(
        &self,
        unit: Option<u8>,
        address: u16,
        values: &[u16],
    ) -> TransportResult<()> {
        self.write(MockWrite::Registers {
            unit,
            address,
            values: values.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RegisterKind;

    #[tokio::test]
    async fn test_unset_address_is_exception() {
        let mock = MockTransport::default();
        let err = mock.read_holding_registers(None, 10, 1).await.unwrap_err();
        assert!(matches!(err, TransportError::Exception(_)));
    }

    #[tokio::test]
    async fn test_write_echoes() {
        let mock = MockTransport::default();
        mock.write_registers(Some(1), 5, &[1, 2]).await.unwrap();
        assert_eq!(mock.holding(5), Some(1));
        assert_eq!(mock.holding(6), Some(2));

        mock.write_coil(None, 3, true).await.unwrap();
        assert_eq!(mock.read_coils(None, 3, 1).await.unwrap(), vec![true]);
        assert_eq!(mock.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_read_registers_by_kind() {
        let mock = MockTransport::default();
        mock.set_holding(0, 1);
        mock.set_input(0, 2);

        let holding = mock.read_registers(RegisterKind::Holding, None, 0, 1).await;
        let input = mock.read_registers(RegisterKind::Input, None, 0, 1).await;
        assert_eq!(holding.unwrap(), vec![1]);
        assert_eq!(input.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_offline() {
        let mock = MockTransport::default();
        mock.set_holding(0, 1);
        mock.set_offline(true);
        assert!(matches!(
            mock.read_holding_registers(None, 0, 1).await,
            Err(TransportError::Connection(_))
        ));
        assert!(mock.write_register(None, 0, 2).await.is_err());
        assert_eq!(mock.holding(0), Some(1));

        mock.set_offline(false);
        assert_eq!(mock.read_holding_registers(None, 0, 1).await.unwrap(), vec![1]);
    }
}
