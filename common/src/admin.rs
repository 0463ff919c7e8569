//! Topic administration run once at process start, before any producer or
//! consumer touches the broker.

use crate::errors::{Error, Result};
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use std::time::Duration;
use tracing::{info, warn};

const ADMIN_TIMEOUT: Duration = Duration::from_secs(30);
const RETENTION_KEY: &str = "retention.ms";

#[derive(Debug, Clone, PartialEq)]
pub struct TopicSettings {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
    pub retention_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    Created,
    RetentionUpdated,
}

pub fn admin_client(brokers: &str) -> Result<AdminClient<DefaultClientContext>> {
    let client = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()?;
    Ok(client)
}

/// Makes sure `settings.name` exists with the requested retention.
///
/// A missing topic is created with the requested partitions and replication.
/// An existing topic only gets its retention entry rewritten; its partition
/// count is never touched.
pub async fn ensure_topic(brokers: &str, settings: &TopicSettings) -> Result<TopicAction> {
    let admin = admin_client(brokers)?;
    let opts = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));
    let retention = settings.retention_ms.to_string();

    if topic_exists(brokers, &settings.name).await? {
        let alter = AlterConfig::new(ResourceSpecifier::Topic(&settings.name))
            .set(RETENTION_KEY, &retention);
        let results = admin.alter_configs(&[alter], &opts).await?;
        for result in results {
            if let Err((_, code)) = result {
                return Err(admin_error(&settings.name, format!("alter config failed: {}", code)));
            }
        }
        info!(
            "Topic {} exists, retention set to {} ms",
            settings.name, settings.retention_ms
        );
        return Ok(TopicAction::RetentionUpdated);
    }

    let topic = NewTopic::new(
        &settings.name,
        settings.partitions,
        TopicReplication::Fixed(settings.replication),
    )
    .set(RETENTION_KEY, &retention);

    let results = admin.create_topics(&[topic], &opts).await?;
    for result in results {
        if let Err((name, code)) = result {
            return Err(admin_error(&name, format!("create failed: {}", code)));
        }
    }
    info!(
        "Created topic {} with {} partitions, replication {}, retention {} ms",
        settings.name, settings.partitions, settings.replication, settings.retention_ms
    );
    Ok(TopicAction::Created)
}

async fn topic_exists(brokers: &str, topic: &str) -> Result<bool> {
    let brokers = brokers.to_string();
    let topic = topic.to_string();

    tokio::task::spawn_blocking(move || -> Result<bool> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .create()?;
        let metadata = consumer.fetch_metadata(None, ADMIN_TIMEOUT)?;
        Ok(metadata.topics().iter().any(|t| t.name() == topic))
    })
    .await?
}

/// Removes a consumer group from the broker. Used to clean up the
/// per-viewer groups of the live monitor; failures are only logged.
pub async fn delete_consumer_group(brokers: &str, group_id: &str) {
    let admin = match admin_client(brokers) {
        Ok(admin) => admin,
        Err(e) => {
            warn!("Cannot create admin client to delete group {}: {}", group_id, e);
            return;
        }
    };
    let opts = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

    match admin.delete_groups(&[group_id], &opts).await {
        Ok(results) => {
            for result in results {
                if let Err((group, code)) = result {
                    warn!("Failed to delete consumer group {}: {}", group, code);
                }
            }
        }
        Err(e) => warn!("Failed to delete consumer group {}: {}", group_id, e),
    }
}

fn admin_error(topic: &str, reason: String) -> Error {
    Error::Admin {
        topic: topic.to_string(),
        reason,
    }
}
