mod config;
mod errors;
mod fanout;
mod metrics;
mod model;
mod rest;

use axum::{routing::get, Router};
use clap::Parser;
use coldchain_common::db::{make_pool, redact};
use config::Config;
use fanout::FanoutSettings;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting cold-chain monitor");
    info!("Brokers: {}, topic: {}", config.brokers, config.topic);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", redact(&config.database_url));

    metrics::init_metrics();

    let pool = match make_pool(&config.database_url, 5).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to analytics store: {}", e);
            std::process::exit(1);
        }
    };

    let settings = FanoutSettings {
        brokers: config.brokers.clone(),
        topic: config.topic.clone(),
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pool))
        .merge(fanout::create_router(settings));

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
