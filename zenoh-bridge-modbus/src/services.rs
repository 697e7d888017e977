//! Raw write services.
//!
//! - `{prefix}/@/write_register`: `{ hub?, unit, address, value: u16 | [u16] }`
//! - `{prefix}/@/write_coil`: `{ hub?, unit, address, state: bool }`

use std::collections::HashMap;
use std::sync::Arc;

use modbus_entities::Transport;
use serde::Deserialize;
use tracing::{debug, info, warn};
use zenoh::Session;
use zenoh::sample::SampleKind;

use crate::error::{BridgeError, Result};

/// Register value to write: one word or a block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Single(u16),
    Multiple(Vec<u16>),
}

/// Payload of `@/write_register`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteRegisterRequest {
    #[serde(default = "default_hub")]
    pub hub: String,
    pub unit: u8,
    pub address: u16,
    pub value: RegisterValue,
}

/// Payload of `@/write_coil`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteCoilRequest {
    #[serde(default = "default_hub")]
    pub hub: String,
    pub unit: u8,
    pub address: u16,
    pub state: bool,
}

fn default_hub() -> String {
    modbus_entities::config::DEFAULT_HUB.to_string()
}

fn find_hub<'a, T>(hubs: &'a HashMap<String, Arc<T>>, name: &str) -> Result<&'a Arc<T>> {
    hubs.get(name).ok_or_else(|| BridgeError::Hub {
        hub: name.to_string(),
        message: "unknown hub".to_string(),
    })
}

/// Execute a register write request.
pub async fn write_register<T: Transport>(
    hubs: &HashMap<String, Arc<T>>,
    request: &WriteRegisterRequest,
) -> Result<()> {
    let hub = find_hub(hubs, &request.hub)?;
    let unit = Some(request.unit);

    let result = match &request.value {
        RegisterValue::Single(value) => hub.write_register(unit, request.address, *value).await,
        RegisterValue::Multiple(values) => {
            hub.write_registers(unit, request.address, values).await
        }
    };

    result.map_err(|e| BridgeError::Hub {
        hub: request.hub.clone(),
        message: e.to_string(),
    })
}

/// Execute a coil write request.
pub async fn write_coil<T: Transport>(
    hubs: &HashMap<String, Arc<T>>,
    request: &WriteCoilRequest,
) -> Result<()> {
    let hub = find_hub(hubs, &request.hub)?;
    hub.write_coil(Some(request.unit), request.address, request.state)
        .await
        .map_err(|e| BridgeError::Hub {
            hub: request.hub.clone(),
            message: e.to_string(),
        })
}

/// Serve both write services until the task is aborted.
pub async fn run_services<T: Transport>(
    session: Session,
    key_prefix: String,
    hubs: HashMap<String, Arc<T>>,
) -> Result<()> {
    let register_key = format!("{}/@/write_register", key_prefix);
    let coil_key = format!("{}/@/write_coil", key_prefix);

    let registers = session.declare_subscriber(&register_key).await?;
    let coils = session.declare_subscriber(&coil_key).await?;

    info!(register = %register_key, coil = %coil_key, "Write services ready");

    loop {
        tokio::select! {
            sample = registers.recv_async() => {
                let Ok(sample) = sample else { break };
                if sample.kind() == SampleKind::Delete {
                    continue;
                }
                match serde_json::from_slice::<WriteRegisterRequest>(&sample.payload().to_bytes()) {
                    Ok(request) => match write_register(&hubs, &request).await {
                        Ok(()) => debug!(?request, "Register written"),
                        Err(e) => warn!(?request, error = %e, "Register write failed"),
                    },
                    Err(e) => warn!(error = %e, "Invalid write_register request"),
                }
            }
            sample = coils.recv_async() => {
                let Ok(sample) = sample else { break };
                if sample.kind() == SampleKind::Delete {
                    continue;
                }
                match serde_json::from_slice::<WriteCoilRequest>(&sample.payload().to_bytes()) {
                    Ok(request) => match write_coil(&hubs, &request).await {
                        Ok(()) => debug!(?request, "Coil written"),
                        Err(e) => warn!(?request, error = %e, "Coil write failed"),
                    },
                    Err(e) => warn!(error = %e, "Invalid write_coil request"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_entities::testing::{MockTransport, MockWrite};

    fn hubs() -> (Arc<MockTransport>, HashMap<String, Arc<MockTransport>>) {
        let mock = Arc::new(MockTransport::default());
        let hubs = HashMap::from([("default".to_string(), mock.clone())]);
        (mock, hubs)
    }

    #[test]
    fn test_parse_requests() {
        let req: WriteRegisterRequest =
            serde_json::from_str(r#"{"unit": 1, "address": 10, "value": 5}"#).unwrap();
        assert_eq!(req.hub, "default");
        assert_eq!(req.value, RegisterValue::Single(5));

        let req: WriteRegisterRequest =
            serde_json::from_str(r#"{"hub": "plc", "unit": 1, "address": 10, "value": [1, 2]}"#)
                .unwrap();
        assert_eq!(req.value, RegisterValue::Multiple(vec![1, 2]));

        let req: WriteCoilRequest =
            serde_json::from_str(r#"{"unit": 2, "address": 3, "state": true}"#).unwrap();
        assert!(req.state);

        assert!(serde_json::from_str::<WriteCoilRequest>(r#"{"address": 3}"#).is_err());
    }

    #[tokio::test]
    async fn test_write_register_single_and_block() {
        let (mock, hubs) = hubs();

        let single = WriteRegisterRequest {
            hub: "default".to_string(),
            unit: 1,
            address: 10,
            value: RegisterValue::Single(5),
        };
        write_register(&hubs, &single).await.unwrap();

        let block = WriteRegisterRequest {
            value: RegisterValue::Multiple(vec![7, 8]),
            ..single
        };
        write_register(&hubs, &block).await.unwrap();

        assert_eq!(
            mock.writes(),
            vec![
                MockWrite::Register {
                    unit: Some(1),
                    address: 10,
                    value: 5
                },
                MockWrite::Registers {
                    unit: Some(1),
                    address: 10,
                    values: vec![7, 8]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_write_coil() {
        let (mock, hubs) = hubs();
        let request = WriteCoilRequest {
            hub: "default".to_string(),
            unit: 1,
            address: 4,
            state: true,
        };
        write_coil(&hubs, &request).await.unwrap();
        assert_eq!(mock.coil(4), Some(true));
    }

    #[tokio::test]
    async fn test_unknown_hub_and_offline() {
        let (mock, hubs) = hubs();
        let request = WriteCoilRequest {
            hub: "other".to_string(),
            unit: 1,
            address: 4,
            state: true,
        };
        assert!(matches!(
            write_coil(&hubs, &request).await,
            Err(BridgeError::Hub { .. })
        ));

        mock.set_offline(true);
        let request = WriteCoilRequest {
            hub: "default".to_string(),
            ..request
        };
        assert!(write_coil(&hubs, &request).await.is_err());
    }
}
