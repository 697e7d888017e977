//! Register sensors.

use std::sync::Arc;

use crate::decoder::{RegisterSpec, decode};
use crate::entity::{Availability, Entity};
use crate::error::DecodeError;
use crate::restore::{RestoreState, StoredState};
use crate::transport::Transport;
use crate::value::DecodedValue;

/// A sensor backed by one or more consecutive registers.
///
/// The last decoded value is kept across failed polls.
#[derive(Debug)]
pub struct RegisterSensor<T> {
    hub: Arc<T>,
    spec: RegisterSpec,
    unit: Option<u8>,
    unit_of_measurement: Option<String>,
    device_class: Option<String>,
    value: Option<DecodedValue>,
    availability: Availability,
}

impl<T: Transport> RegisterSensor<T> {
    pub fn new(hub: Arc<T>, spec: RegisterSpec) -> Self {
        Self {
            hub,
            spec,
            unit: None,
            unit_of_measurement: None,
            device_class: None,
            value: None,
            availability: Availability::new(),
        }
    }

    /// Slave id to address, `None` for the hub default.
    pub fn with_unit(mut self, unit: Option<u8>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_unit_of_measurement(mut self, unit: Option<String>) -> Self {
        self.unit_of_measurement = unit;
        self
    }

    pub fn with_device_class(mut self, class: Option<String>) -> Self {
        self.device_class = class;
        self
    }

    pub fn spec(&self) -> &RegisterSpec {
        &self.spec
    }

    /// Last decoded (or restored) value.
    pub fn value(&self) -> Option<&DecodedValue> {
        self.value.as_ref()
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.unit_of_measurement.as_deref()
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    fn mark_unavailable(&mut self, reason: &dyn std::fmt::Display) {
        if self.availability.set_unavailable() {
            tracing::warn!(
                entity = %self.spec.name(),
                hub = %self.hub.name(),
                address = self.spec.address(),
                error = %reason,
                "Sensor unavailable"
            );
        } else {
            tracing::debug!(entity = %self.spec.name(), error = %reason, "Sensor still unavailable");
        }
    }
}

impl<T: Transport> Entity for RegisterSensor<T> {
    fn name(&self) -> &str {
        self.spec.name()
    }

    fn state(&self) -> Option<String> {
        self.value.as_ref().map(ToString::to_string)
    }

    fn available(&self) -> bool {
        self.availability.is_available()
    }

    async fn update(&mut self) {
        let words = match self
            .hub
            .read_registers(
                self.spec.kind(),
                self.unit,
                self.spec.address(),
                self.spec.count(),
            )
            .await
        {
            Ok(words) => words,
            Err(e) => {
                self.mark_unavailable(&e);
                return;
            }
        };

        match decode(&words, &self.spec) {
            Ok(value) => {
                if self.availability.set_available() {
                    tracing::info!(entity = %self.spec.name(), "Sensor available again");
                }
                self.value = Some(value);
            }
            Err(e @ DecodeError::WordCount { .. }) => self.mark_unavailable(&e),
            Err(e @ DecodeError::Text(_)) => {
                self.availability.set_available();
                tracing::warn!(entity = %self.spec.name(), error = %e, "Keeping previous value");
            }
        }
    }
}

impl<T: Transport> RestoreState for RegisterSensor<T> {
    fn restore_state(&mut self, stored: &StoredState) {
        self.value = Some(DecodedValue::Text(stored.state.clone()));
    }
}
