//! The analyzer's consumer-group member.
//!
//! Every claimed message is analyzed, relayed to the sink topic and only then
//! marked consumed. A message whose analysis or relay fails is left unmarked
//! and the loop moves on; because committed offsets only move forward, the
//! next marked message on the same partition commits past it and the skipped
//! message is never redelivered to this group.

use crate::analysis::Analysis;
use crate::errors::{Error, Result};
use crate::metrics::{
    ANALYSIS_FAILURES_TOTAL, COMMITTED_TOTAL, MESSAGES_TOTAL, RELAY_FAILURES_TOTAL,
};
use async_trait::async_trait;
use coldchain_common::consumer::is_fatal;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Message;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Analyzed and relayed; advance the group's offset past this message.
    Commit,
    /// A step failed; leave the offset where it is.
    Skip,
}

/// Forwards a processed message downstream.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn relay(&self, key: &[u8], payload: &[u8]) -> Result<()>;
}

pub struct KafkaRelay {
    producer: FutureProducer,
    topic: String,
}

impl KafkaRelay {
    pub fn new(brokers: &str, topic: &str) -> Result<Self> {
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
}

#[async_trait]
impl Relay for KafkaRelay {
    async fn relay(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(RELAY_TIMEOUT))
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub offset_reset: String,
}

pub struct StreamProcessor<A, R> {
    analysis: A,
    relay: R,
}

impl<A: Analysis, R: Relay> StreamProcessor<A, R> {
    pub fn new(analysis: A, relay: R) -> Self {
        Self { analysis, relay }
    }

    /// Runs analysis then relay for one message.
    pub async fn handle(&self, key: Option<&[u8]>, payload: Option<&[u8]>) -> Disposition {
        let (key, payload) = match (key, payload) {
            (Some(key), Some(payload)) => (key, payload),
            (None, _) => return self.analysis_failed(&Error::MissingField("key")),
            (_, None) => return self.analysis_failed(&Error::MissingField("payload")),
        };

        let analyzed = match decode(key, payload) {
            Ok((device_id, reading)) => self.analysis.analyze(device_id, reading).await,
            Err(e) => Err(e),
        };
        if let Err(e) = analyzed {
            return self.analysis_failed(&e);
        }

        if let Err(e) = self.relay.relay(key, payload).await {
            RELAY_FAILURES_TOTAL.inc();
            error!("Relay error: {}", e);
            return Disposition::Skip;
        }

        Disposition::Commit
    }

    fn analysis_failed(&self, e: &Error) -> Disposition {
        ANALYSIS_FAILURES_TOTAL.inc();
        if e.is_not_found() {
            warn!("Analysis error: {}", e);
        } else {
            error!("Analysis error: {}", e);
        }
        Disposition::Skip
    }

    /// Claims messages until the group session fails.
    ///
    /// Messages are handled one at a time, so order within a partition is
    /// the order they were produced in.
    pub async fn consume(&self, consumer: &StreamConsumer) -> Result<()> {
        loop {
            match consumer.recv().await {
                Ok(message) => {
                    MESSAGES_TOTAL.inc();
                    match self.handle(message.key(), message.payload()).await {
                        Disposition::Commit => {
                            if let Err(e) = consumer.store_offset_from_message(&message) {
                                warn!(
                                    "Failed to mark partition {} offset {}: {}",
                                    message.partition(),
                                    message.offset(),
                                    e
                                );
                                continue;
                            }
                            COMMITTED_TOTAL.inc();
                        }
                        Disposition::Skip => {
                            debug!(
                                "Left partition {} offset {} unmarked",
                                message.partition(),
                                message.offset()
                            );
                        }
                    }
                }
                Err(e) if is_fatal(&e) => return Err(e.into()),
                Err(e) => warn!("Consume error: {}", e),
            }
        }
    }

    /// Keeps a group membership alive for the life of the process.
    ///
    /// Each time the consume loop exits, a fresh consumer joins the group,
    /// but never sooner than `retry_interval` after the previous attempt.
    pub async fn run(&self, settings: &ConsumerSettings, retry_interval: Duration) {
        self.supervise(retry_interval, || {
            let consumer = create_consumer(settings)?;
            info!(
                "Joined group {} on topic {} at {}",
                settings.group_id, settings.topic, settings.brokers
            );
            Ok(consumer)
        })
        .await
    }

    async fn supervise<F>(&self, retry_interval: Duration, mut connect: F)
    where
        F: FnMut() -> Result<StreamConsumer>,
    {
        loop {
            let attempt = Instant::now();

            match connect() {
                Ok(consumer) => {
                    if let Err(e) = self.consume(&consumer).await {
                        error!("Consume error: {}", e);
                    }
                    // Closing leaves the group and blocks until it has.
                    if let Err(e) = tokio::task::spawn_blocking(move || drop(consumer)).await {
                        warn!("Closing consumer failed: {}", e);
                    }
                }
                Err(e) => error!("Cannot create consumer: {}", e),
            }

            let elapsed = attempt.elapsed();
            if elapsed < retry_interval {
                tokio::time::sleep(retry_interval - elapsed).await;
            }
        }
    }
}

pub fn create_consumer(settings: &ConsumerSettings) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &settings.brokers)
        .set("group.id", &settings.group_id)
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", &settings.offset_reset)
        .set("session.timeout.ms", "30000")
        .create()?;

    consumer.subscribe(&[settings.topic.as_str()])?;
    Ok(consumer)
}

fn decode<'a>(key: &'a [u8], payload: &'a [u8]) -> Result<(&'a str, &'a str)> {
    let device_id = std::str::from_utf8(key).map_err(|_| Error::Encoding("key"))?;
    let reading = std::str::from_utf8(payload).map_err(|_| Error::Encoding("payload"))?;
    Ok((device_id, reading))
}
