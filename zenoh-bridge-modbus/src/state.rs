//! Entity state payloads and the per-kind glue between entities and Zenoh.

use std::future::Future;

use modbus_entities::{
    BinarySensor, CoilSwitch, Entity, RegisterSensor, RegisterSwitch, RestoreState, Switch,
    Transport,
};
use serde::{Deserialize, Serialize};

/// State published on `{prefix}/{entity}/state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub name: String,
    /// Text state, `None` until the first successful read or restore.
    pub state: Option<String>,
    pub available: bool,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_on: Option<bool>,
}

impl EntityState {
    /// Capture the common part of an entity's state.
    pub fn of(entity: &impl Entity) -> Self {
        Self {
            name: entity.name().to_string(),
            state: entity.state(),
            available: entity.available(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            unit_of_measurement: None,
            device_class: None,
            is_on: None,
        }
    }

    pub fn with_unit_of_measurement(mut self, unit: Option<&str>) -> Self {
        self.unit_of_measurement = unit.map(str::to_string);
        self
    }

    pub fn with_device_class(mut self, class: Option<&str>) -> Self {
        self.device_class = class.map(str::to_string);
        self
    }

    pub fn with_is_on(mut self, is_on: Option<bool>) -> Self {
        self.is_on = is_on;
        self
    }
}

/// Parse a `/set` payload into the requested on/off state.
pub fn parse_command(payload: &str) -> Option<bool> {
    match payload.trim().trim_matches('"').to_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// An entity the bridge can run: snapshot, persist and optionally command.
pub trait BridgeEntity: RestoreState + 'static {
    /// State payload to publish.
    fn snapshot(&self) -> EntityState;

    /// Whether the entity listens on `/set`.
    fn accepts_commands(&self) -> bool {
        false
    }

    /// Apply an on/off command.
    fn command(&mut self, on: bool) -> impl Future<Output = ()> + Send {
        let _ = on;
        async {}
    }
}

impl<T: Transport> BridgeEntity for RegisterSensor<T> {
    fn snapshot(&self) -> EntityState {
        EntityState::of(self)
            .with_unit_of_measurement(self.unit_of_measurement())
            .with_device_class(self.device_class())
    }
}

impl<T: Transport> BridgeEntity for BinarySensor<T> {
    fn snapshot(&self) -> EntityState {
        EntityState::of(self)
            .with_device_class(self.device_class())
            .with_is_on(self.is_on())
    }
}

impl<T: Transport> BridgeEntity for CoilSwitch<T> {
    fn snapshot(&self) -> EntityState {
        EntityState::of(self).with_is_on(Switch::is_on(self))
    }

    fn accepts_commands(&self) -> bool {
        true
    }

    async fn command(&mut self, on: bool) {
        if on {
            self.turn_on().await;
        } else {
            self.turn_off().await;
        }
    }
}

impl<T: Transport> BridgeEntity for RegisterSwitch<T> {
    fn snapshot(&self) -> EntityState {
        EntityState::of(self).with_is_on(Switch::is_on(self))
    }

    fn accepts_commands(&self) -> bool {
        true
    }

    async fn command(&mut self, on: bool) {
        RegisterSwitch::command(self, on).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_entities::testing::MockTransport;
    use modbus_entities::{InputType, RegisterSpec};
    use std::sync::Arc;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("on"), Some(true));
        assert_eq!(parse_command(" OFF\n"), Some(false));
        assert_eq!(parse_command("\"true\""), Some(true));
        assert_eq!(parse_command("1"), Some(true));
        assert_eq!(parse_command("0"), Some(false));
        assert_eq!(parse_command("toggle"), None);
        assert_eq!(parse_command(""), None);
    }

    #[tokio::test]
    async fn test_sensor_snapshot() {
        let mock = Arc::new(MockTransport::default());
        mock.set_holding(0, 215);
        let spec = RegisterSpec::builder("temperature", 0)
            .scale(0.1)
            .precision(1)
            .build()
            .unwrap();
        let mut sensor = RegisterSensor::new(mock, spec)
            .with_unit_of_measurement(Some("°C".to_string()));
        sensor.update().await;

        let state = sensor.snapshot();
        assert_eq!(state.name, "temperature");
        assert_eq!(state.state.as_deref(), Some("21.5"));
        assert!(state.available);
        assert_eq!(state.unit_of_measurement.as_deref(), Some("°C"));
        assert!(!sensor.accepts_commands());

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("is_on").is_none());
        assert!(json.get("device_class").is_none());
    }

    #[tokio::test]
    async fn test_switch_command() {
        let mock = Arc::new(MockTransport::default());
        let mut switch = CoilSwitch::new(mock.clone(), "light", 3);
        assert!(switch.accepts_commands());

        BridgeEntity::command(&mut switch, true).await;
        assert_eq!(mock.coil(3), Some(true));

        let state = switch.snapshot();
        assert_eq!(state.is_on, Some(true));
        assert_eq!(state.state.as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn test_binary_sensor_ignores_command() {
        let mock = Arc::new(MockTransport::default());
        let mut sensor = BinarySensor::new(mock.clone(), "door", 0, InputType::Coil);
        BridgeEntity::command(&mut sensor, true).await;
        assert!(mock.writes().is_empty());
        assert_eq!(sensor.snapshot().is_on, None);
    }
}
