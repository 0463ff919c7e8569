//! Read-through lookup of per-device alerting thresholds.
//!
//! The cache is consulted first; on a miss (or when the cache cannot be
//! reached) the relational store answers and the cache is filled with no
//! expiry. Nothing ever invalidates a cached entry, so a threshold edited in
//! the relational store is only picked up after the cache key is removed.

use crate::errors::Result;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
use crate::model::DeviceThresholds;
use async_trait::async_trait;
use coldchain_common::modules::ModuleRepository;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "device:thresholds:";

/// Byte-oriented cache capability. Entries written here never expire.
#[async_trait]
pub trait ThresholdCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Authoritative source of thresholds.
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn device_thresholds(&self, device_id: &str) -> Result<DeviceThresholds>;
}

#[async_trait]
impl ThresholdStore for ModuleRepository {
    async fn device_thresholds(&self, device_id: &str) -> Result<DeviceThresholds> {
        Ok(ModuleRepository::device_thresholds(self, device_id).await?)
    }
}

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connects and pings, so an unreachable cache fails at startup.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ThresholdCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct DeviceDirectory {
    cache: Arc<dyn ThresholdCache>,
    store: Arc<dyn ThresholdStore>,
}

impl DeviceDirectory {
    pub fn new(cache: Arc<dyn ThresholdCache>, store: Arc<dyn ThresholdStore>) -> Self {
        Self { cache, store }
    }

    pub async fn get(&self, device_id: &str) -> Result<DeviceThresholds> {
        let key = cache_key(device_id);

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => {
                CACHE_HITS_TOTAL.inc();
                debug!("Cache hit for device {}", device_id);
                return Ok(serde_json::from_slice(&bytes)?);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for device {}: {}", device_id, e),
        }
        CACHE_MISSES_TOTAL.inc();

        let thresholds = self.store.device_thresholds(device_id).await?;

        match serde_json::to_vec(&thresholds) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&key, bytes).await {
                    warn!("Cache write failed for device {}: {}", device_id, e);
                }
            }
            Err(e) => warn!("Cannot serialize thresholds for {}: {}", device_id, e),
        }

        Ok(thresholds)
    }
}

fn cache_key(device_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, device_id)
}
