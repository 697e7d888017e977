//! Integration tests for modbus-entities.

use std::collections::HashMap;
use std::sync::Arc;

use modbus_entities::testing::MockTransport;
use modbus_entities::{
    EntitiesConfig, Entity, JsonFileStore, MemoryStore, RestoreState, StateStore, Switch,
    persist_entity, restore_entity,
};

const CONFIG: &str = r#"{
    sensors: [
        { name: "temperature", register: 0, scale: 0.1, precision: 1, unit_of_measurement: "°C" },
        { name: "energy", register: 2, count: 2, data_type: "uint" },
        { name: "alarm_bit", register: 4, bit: 3 },
        { name: "label", register: 5, count: 2, data_type: "string" },
    ],
    binary_sensors: [
        { name: "door", address: 0, input_type: "discrete_input" },
    ],
    switches: {
        coils: [ { name: "light", coil: 1 } ],
        registers: [
            { name: "pump", register: "%MX401.5", state: "%QX4.7", settle_delay_ms: 0 },
        ],
    },
}"#;

fn device() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new("default"));
    mock.set_holding(0, 215);
    mock.set_holding_words(2, &[0x0001, 0x0000]);
    mock.set_holding(4, 0b0100);
    mock.set_holding_words(5, &[0x4F4B, 0x2121]);
    mock.set_discrete_input(0, true);
    mock.set_coil(1, false);
    mock.set_holding(204, 0);
    mock
}

fn hubs(mock: &Arc<MockTransport>) -> HashMap<String, Arc<MockTransport>> {
    HashMap::from([("default".to_string(), mock.clone())])
}

#[tokio::test]
async fn test_config_to_polled_states() {
    let mock = device();
    let config = EntitiesConfig::from_json5(CONFIG).expect("config should parse");
    let mut entities = config.build(&hubs(&mock)).expect("entities should build");
    assert_eq!(entities.len(), 7);

    for sensor in &mut entities.sensors {
        sensor.update().await;
    }
    let states: Vec<_> = entities
        .sensors
        .iter()
        .map(|s| s.state().unwrap_or_default())
        .collect();
    assert_eq!(states, vec!["21.5", "65536", "1", "OK!!"]);

    entities.binary_sensors[0].update().await;
    assert_eq!(entities.binary_sensors[0].is_on(), Some(true));

    let light = &mut entities.coil_switches[0];
    light.update().await;
    assert_eq!(light.is_on(), Some(false));
    light.turn_on().await;
    assert_eq!(mock.coil(1), Some(true));
}

#[tokio::test]
async fn test_register_switch_cycle() {
    let mock = device();
    let config = EntitiesConfig::from_json5(CONFIG).unwrap();
    let mut entities = config.build(&hubs(&mock)).unwrap();
    let pump = &mut entities.register_switches[0];

    // Status still reads off after the pulse
    pump.turn_on().await;
    assert_eq!(pump.is_on(), Some(false));
    assert_eq!(mock.holding(400), Some(32));

    // Device reports on
    mock.set_holding(204, 0x80);
    pump.update().await;
    assert_eq!(pump.is_on(), Some(true));

    // Device goes away: state is kept, entity is unavailable
    mock.set_offline(true);
    pump.update().await;
    assert!(!pump.available());
    assert_eq!(pump.is_on(), Some(true));
}

#[tokio::test]
async fn test_restore_then_poll() {
    let mock = device();
    let store = MemoryStore::new();
    let config = EntitiesConfig::from_json5(CONFIG).unwrap();

    {
        let mut entities = config.build(&hubs(&mock)).unwrap();
        let temperature = &mut entities.sensors[0];
        temperature.update().await;
        assert!(persist_entity(&*temperature, &store).unwrap());
        // unchanged state is not written again
        assert!(!persist_entity(&*temperature, &store).unwrap());
    }

    mock.set_offline(true);
    let mut entities = config.build(&hubs(&mock)).unwrap();
    let temperature = &mut entities.sensors[0];
    assert!(restore_entity(temperature, &store));
    temperature.update().await;

    assert!(!temperature.available());
    assert_eq!(temperature.state().as_deref(), Some("21.5"));

    let pump = &mut entities.register_switches[0];
    assert!(!restore_entity(pump, &store));
    assert_eq!(pump.is_on(), None);
}

#[tokio::test]
async fn test_switch_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    let mock = device();
    let config = EntitiesConfig::from_json5(CONFIG).unwrap();

    {
        let store = JsonFileStore::open(&path).unwrap();
        let mut entities = config.build(&hubs(&mock)).unwrap();
        let light = &mut entities.coil_switches[0];
        light.turn_on().await;
        persist_entity(&*light, &store).unwrap();
    }

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.load("light").unwrap().state, "on");

    let mut entities = config.build(&hubs(&mock)).unwrap();
    let light = &mut entities.coil_switches[0];
    assert!(restore_entity(light, &store));
    assert_eq!(light.is_on(), Some(true));
    assert_eq!(light.stored_state().unwrap().state, "on");
}
