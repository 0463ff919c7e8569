use crate::fleet::Fleet;
use coldchain_common::reading::Reading;
use futures::future::join_all;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_EVERY: u64 = 10_000;

/// Publishes readings keyed by device id, so a hash partitioner keeps each
/// device on a single partition.
pub struct TelemetryPublisher {
    producer: FutureProducer,
    topic: String,
}

impl TelemetryPublisher {
    pub fn new(brokers: &str, topic: &str) -> coldchain_common::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }

    /// Sends one tick worth of readings. Returns how many were delivered.
    pub async fn publish(&self, readings: &[(String, Reading)]) -> usize {
        let payloads: Vec<String> = readings.iter().map(|(_, r)| r.encode()).collect();

        let sends = readings.iter().zip(&payloads).map(|((device_id, _), payload)| {
            let record = FutureRecord::to(&self.topic)
                .key(device_id.as_str())
                .payload(payload.as_str());
            self.producer.send(record, Timeout::After(QUEUE_TIMEOUT))
        });

        let mut delivered = 0;
        for (result, (device_id, _)) in join_all(sends).await.into_iter().zip(readings) {
            match result {
                Ok((partition, offset)) => {
                    delivered += 1;
                    debug!(
                        "Sent reading for {} to partition {} offset {}",
                        device_id, partition, offset
                    );
                }
                Err((e, _)) => warn!("Failed to send reading for {}: {}", device_id, e),
            }
        }
        delivered
    }
}

/// Emits one reading per device per tick at `rate` ticks per second.
pub async fn run_emitter(fleet: Arc<Fleet>, publisher: TelemetryPublisher, rate: u64) {
    let period = Duration::from_secs_f64(1.0 / rate as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Emitting every {:?} ({} ticks/s)", period, rate);

    let mut sent = 0u64;
    loop {
        ticker.tick().await;
        let tick_start = Instant::now();

        let readings = fleet.tick().await;
        if readings.is_empty() {
            continue;
        }

        let before = sent;
        sent += publisher.publish(&readings).await as u64;
        if sent / PROGRESS_EVERY > before / PROGRESS_EVERY {
            info!("Published {} readings", sent);
        }

        let elapsed = tick_start.elapsed();
        if elapsed > period * 2 {
            debug!(
                "Tick for {} devices took {:?}, target was {:?}",
                readings.len(),
                elapsed,
                period
            );
        }
    }
}
