//! Coil and discrete input sensors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{Availability, Entity, on_off};
use crate::restore::{RestoreState, StoredState};
use crate::transport::Transport;

/// The single-bit bank a binary sensor reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Coil,
    DiscreteInput,
}

/// A read-only on/off entity.
#[derive(Debug)]
pub struct BinarySensor<T> {
    hub: Arc<T>,
    name: String,
    address: u16,
    input_type: InputType,
    unit: Option<u8>,
    device_class: Option<String>,
    is_on: Option<bool>,
    availability: Availability,
}

impl<T: Transport> BinarySensor<T> {
    pub fn new(hub: Arc<T>, name: impl Into<String>, address: u16, input_type: InputType) -> Self {
        Self {
            hub,
            name: name.into(),
            address,
            input_type,
            unit: None,
            device_class: None,
            is_on: None,
            availability: Availability::new(),
        }
    }

    pub fn with_unit(mut self, unit: Option<u8>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_device_class(mut self, class: Option<String>) -> Self {
        self.device_class = class;
        self
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }
}

impl<T: Transport> Entity for BinarySensor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Option<String> {
        on_off(self.is_on)
    }

    fn available(&self) -> bool {
        self.availability.is_available()
    }

    async fn update(&mut self) {
        let result = match self.input_type {
            InputType::Coil => self.hub.read_coils(self.unit, self.address, 1).await,
            InputType::DiscreteInput => {
                self.hub
                    .read_discrete_inputs(self.unit, self.address, 1)
                    .await
            }
        };

        match result.map(|bits| bits.first().copied()) {
            Ok(Some(bit)) => {
                self.availability.set_available();
                self.is_on = Some(bit);
            }
            Ok(None) => {
                self.availability.set_unavailable();
                tracing::warn!(entity = %self.name, "Empty response");
            }
            Err(e) => {
                if self.availability.set_unavailable() {
                    tracing::warn!(
                        entity = %self.name,
                        hub = %self.hub.name(),
                        address = self.address,
                        error = %e,
                        "Binary sensor unavailable"
                    );
                }
            }
        }
    }
}

impl<T: Transport> RestoreState for BinarySensor<T> {
    fn restore_state(&mut self, stored: &StoredState) {
        self.is_on = Some(stored.state == "on");
    }
}
