mod analysis;
mod batching;
mod config;
mod db;
mod directory;
mod errors;
mod metrics;
mod model;
mod processor;

use analysis::ThresholdAnalysis;
use axum::{routing::get, Router};
use batching::AnalyticsWriter;
use clap::Parser;
use coldchain_common::admin::{ensure_topic, TopicSettings};
use coldchain_common::db::redact;
use coldchain_common::modules::ModuleRepository;
use config::Config;
use directory::{DeviceDirectory, RedisCache};
use processor::{ConsumerSettings, KafkaRelay, StreamProcessor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting cold-chain analyzer");
    info!(
        "Source: {} topic {} (group {}), sink: {} topic {}",
        config.source_brokers, config.source_topic, config.group_id, config.sink_brokers, config.sink_topic
    );
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", redact(&config.database_url));

    metrics::init_metrics();

    let sink_topic = TopicSettings {
        name: config.sink_topic.clone(),
        partitions: config.partitions,
        replication: config.replication,
        retention_ms: config.retention_ms,
    };
    if let Err(e) = ensure_topic(&config.sink_brokers, &sink_topic).await {
        error!("Failed to prepare sink topic {}: {}", config.sink_topic, e);
        std::process::exit(1);
    }

    let relational = match coldchain_common::db::make_pool(&config.database_url, 10).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to relational store: {}", e);
            std::process::exit(1);
        }
    };

    let analytics = match db::make_pool(config.analytics_url()).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to analytics store: {}", e);
            std::process::exit(1);
        }
    };

    let cache = match RedisCache::connect(&config.redis_url).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to connect to cache at {}: {}", config.redis_url, e);
            std::process::exit(1);
        }
    };

    info!("Channel capacity: {}", config.channel_capacity);
    let (writer, rx) = AnalyticsWriter::channel(config.channel_capacity as usize);
    let batcher_handle = tokio::spawn(batching::run_batcher(
        rx,
        analytics,
        config.batch_size,
        config.batch_timeout_ms,
    ));

    let relay = match KafkaRelay::new(&config.sink_brokers, &config.sink_topic) {
        Ok(relay) => relay,
        Err(e) => {
            error!("Failed to create sink producer: {}", e);
            std::process::exit(1);
        }
    };

    let directory = DeviceDirectory::new(
        Arc::new(cache),
        Arc::new(ModuleRepository::new(relational)),
    );
    let analysis = ThresholdAnalysis::new(directory, writer, config.low_battery_threshold);
    let processor = StreamProcessor::new(analysis, relay);

    let settings = ConsumerSettings {
        brokers: config.source_brokers.clone(),
        topic: config.source_topic.clone(),
        group_id: config.group_id.clone(),
        offset_reset: config.offset_reset.clone(),
    };
    let retry_interval = Duration::from_millis(config.retry_interval_ms);
    let processor_handle = tokio::spawn(async move {
        processor.run(&settings, retry_interval).await;
    });

    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = processor_handle => {
            error!("Processor task terminated");
        }
        _ = batcher_handle => {
            error!("Batcher task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
