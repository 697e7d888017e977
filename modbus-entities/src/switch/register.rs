use std::sync::Arc;
use std::time::Duration;

use crate::entity::{Availability, Entity, Switch, on_off};
use crate::error::ConfigError;
use crate::restore::{RestoreState, StoredState};
use crate::switch::address::{BitAddress, SwitchCommand, SwitchState};
use crate::transport::{RegisterKind, Transport};

/// Default wait between a command write and the verification read.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Result of a verification read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Verification is disabled.
    Skipped,
    On,
    Off,
    /// The masked status word matched neither pattern.
    Unexpected(u16),
    /// The read failed.
    Unavailable,
}

/// Immutable description of a bit-addressed register switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSwitchSpec {
    name: String,
    command: SwitchCommand,
    state: SwitchState,
    kind: RegisterKind,
    unit: Option<u8>,
    verify_register: Option<u16>,
    verify_state: bool,
    settle_delay: Duration,
}

impl RegisterSwitchSpec {
    /// Build a spec from its command and state tokens, e.g. `%MX401.5` and `%QX4.5`.
    pub fn from_tokens(
        name: impl Into<String>,
        command_token: &str,
        state_token: &str,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let command = SwitchCommand::from_address(&name, &BitAddress::parse(&name, command_token)?)?;
        let state = SwitchState::from_address(&name, &BitAddress::parse(&name, state_token)?)?;

        Ok(Self {
            name,
            command,
            state,
            kind: RegisterKind::Holding,
            unit: None,
            verify_register: None,
            verify_state: true,
            settle_delay: DEFAULT_SETTLE_DELAY,
        })
    }

    pub fn with_kind(mut self, kind: RegisterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_unit(mut self, unit: Option<u8>) -> Self {
        self.unit = unit;
        self
    }

    /// Read status from `register` instead of the one derived from the state token.
    pub fn with_verify_register(mut self, register: Option<u16>) -> Self {
        self.verify_register = register;
        self
    }

    pub fn with_verify_state(mut self, verify: bool) -> Self {
        self.verify_state = verify;
        self
    }

    /// Match whole status words, see [`SwitchState::with_patterns`].
    pub fn with_patterns(mut self, on: Option<u16>, off: Option<u16>) -> Self {
        self.state = self.state.with_patterns(on, off);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> SwitchCommand {
        self.command
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn unit(&self) -> Option<u8> {
        self.unit
    }

    pub fn verify_state(&self) -> bool {
        self.verify_state
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Register read back to learn the switch state.
    pub fn verify_address(&self) -> u16 {
        self.verify_register.unwrap_or(self.state.register)
    }
}

/// A switch commanded through one bit of a holding register and read back
/// through a status register.
///
/// Commands pulse the command bit: on and off write the same word, and the
/// device toggles accordingly. The state is then learned from the status
/// register after a settle delay.
#[derive(Debug)]
pub struct RegisterSwitch<T> {
    hub: Arc<T>,
    spec: RegisterSwitchSpec,
    is_on: Option<bool>,
    availability: Availability,
}

impl<T: Transport> RegisterSwitch<T> {
    pub fn new(hub: Arc<T>, spec: RegisterSwitchSpec) -> Self {
        Self {
            hub,
            spec,
            is_on: None,
            availability: Availability::new(),
        }
    }

    pub fn spec(&self) -> &RegisterSwitchSpec {
        &self.spec
    }

    /// Write the command word, then settle and verify.
    ///
    /// Without verification the commanded state is trusted right away and
    /// no delay is observed.
    pub async fn command(&mut self, on: bool) -> VerifyOutcome {
        if self.spec.kind.is_writable() {
            self.write_command().await;
            if !self.spec.verify_state {
                self.is_on = Some(on);
            }
        } else {
            tracing::debug!(entity = %self.spec.name, "Input registers are read-only, command not written");
        }

        if !self.spec.verify_state {
            return VerifyOutcome::Skipped;
        }

        tokio::time::sleep(self.spec.settle_delay).await;
        self.verify().await
    }

    /// Read the status register and update the cached state.
    pub async fn verify(&mut self) -> VerifyOutcome {
        if !self.spec.verify_state {
            return VerifyOutcome::Skipped;
        }

        let address = self.spec.verify_address();
        let raw = match self
            .hub
            .read_holding_registers(self.spec.unit, address, 1)
            .await
        {
            Ok(words) if !words.is_empty() => words[0],
            Ok(_) => {
                self.availability.set_unavailable();
                tracing::warn!(entity = %self.spec.name, register = address, "Empty status response");
                return VerifyOutcome::Unavailable;
            }
            Err(e) => {
                if self.availability.set_unavailable() {
                    tracing::warn!(
                        entity = %self.spec.name,
                        hub = %self.hub.name(),
                        register = address,
                        error = %e,
                        "Status read failed"
                    );
                }
                return VerifyOutcome::Unavailable;
            }
        };
        self.availability.set_available();

        match self.spec.state.classify(raw) {
            Some(true) => {
                self.is_on = Some(true);
                VerifyOutcome::On
            }
            Some(false) => {
                self.is_on = Some(false);
                VerifyOutcome::Off
            }
            None => {
                let value = raw & self.spec.state.mask;
                let hex = format!("{:#06x}", value);
                tracing::error!(
                    hub = %self.hub.name(),
                    unit = ?self.spec.unit,
                    register = address,
                    value = %hex,
                    "Unexpected response from switch status register"
                );
                VerifyOutcome::Unexpected(value)
            }
        }
    }

    async fn write_command(&mut self) {
        let command = self.spec.command;
        match self
            .hub
            .write_registers(self.spec.unit, command.register, &[command.value()])
            .await
        {
            Ok(()) => {
                self.availability.set_available();
                tracing::debug!(
                    entity = %self.spec.name,
                    register = command.register,
                    value = command.value(),
                    "Command written"
                );
            }
            Err(e) => {
                self.availability.set_unavailable();
                tracing::warn!(
                    entity = %self.spec.name,
                    hub = %self.hub.name(),
                    register = command.register,
                    error = %e,
                    "Command write failed"
                );
            }
        }
    }
}

impl<T: Transport> Entity for RegisterSwitch<T> {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn state(&self) -> Option<String> {
        on_off(self.is_on)
    }

    fn available(&self) -> bool {
        self.availability.is_available()
    }

    async fn update(&mut self) {
        self.verify().await;
    }
}

impl<T: Transport> Switch for RegisterSwitch<T> {
    fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    async fn turn_on(&mut self) {
        self.command(true).await;
    }

    async fn turn_off(&mut self) {
        self.command(false).await;
    }
}

impl<T: Transport> RestoreState for RegisterSwitch<T> {
    fn restore_state(&mut self, stored: &StoredState) {
        self.is_on = Some(stored.state == "on");
    }
}
