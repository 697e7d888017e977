use std::sync::Arc;

use crate::entity::{Availability, Entity, Switch, on_off};
use crate::restore::{RestoreState, StoredState};
use crate::transport::Transport;

/// A switch mapped onto a single coil.
#[derive(Debug)]
pub struct CoilSwitch<T> {
    hub: Arc<T>,
    name: String,
    coil: u16,
    unit: Option<u8>,
    is_on: Option<bool>,
    availability: Availability,
}

impl<T: Transport> CoilSwitch<T> {
    pub fn new(hub: Arc<T>, name: impl Into<String>, coil: u16) -> Self {
        Self {
            hub,
            name: name.into(),
            coil,
            unit: None,
            is_on: None,
            availability: Availability::new(),
        }
    }

    pub fn with_unit(mut self, unit: Option<u8>) -> Self {
        self.unit = unit;
        self
    }

    pub fn coil(&self) -> u16 {
        self.coil
    }

    /// Read the coil. Any failure marks the switch unavailable and reads as `false`.
    pub async fn read(&mut self) -> bool {
        match self.hub.read_coils(self.unit, self.coil, 1).await {
            Ok(bits) if !bits.is_empty() => {
                self.availability.set_available();
                bits[0]
            }
            Ok(_) => {
                self.availability.set_unavailable();
                tracing::warn!(entity = %self.name, coil = self.coil, "Empty coil response");
                false
            }
            Err(e) => {
                if self.availability.set_unavailable() {
                    tracing::warn!(
                        entity = %self.name,
                        hub = %self.hub.name(),
                        coil = self.coil,
                        error = %e,
                        "Coil read failed"
                    );
                }
                false
            }
        }
    }

    /// Write the coil. A failed write is dropped, only availability records it.
    pub async fn write(&mut self, on: bool) {
        match self.hub.write_coil(self.unit, self.coil, on).await {
            Ok(()) => {
                self.availability.set_available();
            }
            Err(e) => {
                self.availability.set_unavailable();
                tracing::warn!(
                    entity = %self.name,
                    hub = %self.hub.name(),
                    coil = self.coil,
                    error = %e,
                    "Coil write failed"
                );
            }
        }
    }
}

impl<T: Transport> Entity for CoilSwitch<T> {
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
        let on = self.read().await;
        self.is_on = Some(on);
    }
}

impl<T: Transport> Switch for CoilSwitch<T> {
    fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    async fn turn_on(&mut self) {
        self.write(true).await;
        self.is_on = Some(true);
    }

    async fn turn_off(&mut self) {
        self.write(false).await;
        self.is_on = Some(false);
    }
}

impl<T: Transport> RestoreState for CoilSwitch<T> {
    fn restore_state(&mut self, stored: &StoredState) {
        self.is_on = Some(stored.state == "on");
    }
}
