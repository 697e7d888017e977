//! Zenoh bridge for Modbus entities.
//!
//! Polls Modbus sensors and switches and publishes their state to Zenoh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use modbus_entities::{Entity, JsonFileStore, StateStore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use zenoh_bridge_modbus::config::{LoggingConfig, ModbusBridgeConfig};
use zenoh_bridge_modbus::hub::ModbusHub;
use zenoh_bridge_modbus::runner::EntityRunner;
use zenoh_bridge_modbus::state::BridgeEntity;
use zenoh_bridge_modbus::status::BridgeStatus;

/// Zenoh bridge for Modbus sensors and switches.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-modbus")]
#[command(about = "Exposes Modbus sensors and switches over Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ModbusBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    zenoh_bridge_modbus::logging::init_tracing(&log_config)
        .context("Failed to init tracing")?;

    info!("Starting zenoh-bridge-modbus");
    info!("Loaded configuration from {:?}", args.config);

    let modbus = &config.modbus;
    let hubs = ModbusHub::from_configs(&modbus.hubs);
    let entities = modbus
        .entities
        .build(&hubs)
        .context("Failed to build entities")?;

    let store: Option<Arc<dyn StateStore>> = match &modbus.state_file {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .with_context(|| format!("Failed to open state file {:?}", path))?;
            Some(Arc::new(store))
        }
        None => None,
    };

    // Connect to Zenoh
    let session = zenoh_bridge_modbus::session::connect(&config.zenoh)
        .await
        .context("Failed to connect to Zenoh")?;

    let mut tasks = EntityTasks {
        session: session.clone(),
        key_prefix: modbus.key_prefix.clone(),
        interval: Duration::from_secs(modbus.scan_interval_secs),
        store,
        names: Vec::with_capacity(entities.len()),
        handles: Vec::new(),
    };
    tasks.spawn_all(entities.sensors);
    tasks.spawn_all(entities.binary_sensors);
    tasks.spawn_all(entities.coil_switches);
    tasks.spawn_all(entities.register_switches);
    let EntityTasks {
        names,
        handles: mut tasks,
        ..
    } = tasks;

    let services = tokio::spawn({
        let session = session.clone();
        let key_prefix = modbus.key_prefix.clone();
        let hubs = hubs.clone();
        async move {
            if let Err(e) =
                zenoh_bridge_modbus::services::run_services(session, key_prefix, hubs).await
            {
                error!(error = %e, "Write services failed");
            }
        }
    });
    tasks.push(services);

    info!(
        entities = names.len(),
        hubs = hubs.len(),
        "Modbus bridge running"
    );

    // Publish bridge status
    let status = BridgeStatus::running(names, hubs.keys().cloned().collect());
    if let Err(e) = status.publish(&session, &modbus.key_prefix).await {
        error!("Failed to publish bridge status: {}", e);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    for task in tasks {
        task.abort();
    }

    if let Err(e) = BridgeStatus::offline()
        .publish(&session, &modbus.key_prefix)
        .await
    {
        warn!(error = %e, "Failed to publish offline status");
    }

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Modbus bridge stopped");

    Ok(())
}

/// Spawns one runner task per entity.
struct EntityTasks {
    session: zenoh::Session,
    key_prefix: String,
    interval: Duration,
    store: Option<Arc<dyn StateStore>>,
    names: Vec<String>,
    handles: Vec<JoinHandle<()>>,
}

impl EntityTasks {
    fn spawn_all<E: BridgeEntity + Sync>(&mut self, entities: Vec<E>) {
        for entity in entities {
            let name = entity.name().to_string();
            let runner = EntityRunner::new(
                entity,
                self.session.clone(),
                self.key_prefix.clone(),
                self.interval,
            )
            .with_store(self.store.clone());

            self.names.push(name.clone());
            self.handles.push(tokio::spawn(async move {
                if let Err(e) = runner.run().await {
                    error!(entity = %name, error = %e, "Entity task failed");
                }
            }));
        }
    }
}
