mod config;
mod device;
mod fleet;
mod telemetry;

use clap::Parser;
use coldchain_common::admin::{ensure_topic, TopicSettings};
use coldchain_common::db::make_pool;
use coldchain_common::modules::ModuleRepository;
use config::Config;
use device::SimulationParams;
use fleet::Fleet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use telemetry::TelemetryPublisher;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting cold-chain simulator");
    info!(
        "Brokers: {}, topic: {}, rate: {} ticks/s, synthetic devices: {}",
        config.brokers, config.topic, config.rate, config.devices
    );

    let topic = TopicSettings {
        name: config.topic.clone(),
        partitions: config.partitions,
        replication: config.replication,
        retention_ms: config.retention_ms,
    };
    if let Err(e) = ensure_topic(&config.brokers, &topic).await {
        error!("Failed to prepare topic {}: {}", config.topic, e);
        std::process::exit(1);
    }

    let params = SimulationParams {
        battery_drain: config.battery_drain,
        fault_probability: config.fault_probability,
    };
    let fleet = Arc::new(Fleet::new(params, StdRng::from_entropy()));
    fleet
        .seed(&config.device_prefix, config.devices, config.default_setpoint)
        .await;

    let refresh_handle = match &config.database_url {
        Some(url) => {
            let pool = match make_pool(url, 2).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            };
            let repo = ModuleRepository::new(pool);
            let every = Duration::from_secs(config.refresh_interval_secs);
            Some(tokio::spawn(fleet::run_refresh(fleet.clone(), repo, every)))
        }
        None => {
            info!("No DATABASE_URL set, simulating synthetic devices only");
            None
        }
    };

    let publisher = match TelemetryPublisher::new(&config.brokers, &config.topic) {
        Ok(publisher) => publisher,
        Err(e) => {
            error!("Failed to create producer: {}", e);
            std::process::exit(1);
        }
    };
    let emitter_handle = tokio::spawn(telemetry::run_emitter(fleet, publisher, config.rate));

    tokio::select! {
        _ = emitter_handle => {
            error!("Emitter task terminated");
        }
        _ = async {
            match refresh_handle {
                Some(handle) => { let _ = handle.await; }
                None => std::future::pending::<()>().await,
            }
        } => {
            error!("Refresh task terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}
