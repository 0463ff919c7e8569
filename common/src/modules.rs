use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Alerting thresholds of one cold-chain module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceThresholds {
    pub device_id: String,
    pub setpoint: f64,
    pub max_temperature: f64,
    pub min_temperature: f64,
}

impl DeviceThresholds {
    pub fn contains(&self, temperature: f64) -> bool {
        temperature >= self.min_temperature && temperature <= self.max_temperature
    }
}

/// An enabled module as seen by the simulator.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EnabledModule {
    pub device_id: String,
    pub setpoint: f64,
}

/// Read-only access to the `modules` table owned by the CRUD backend.
#[derive(Debug, Clone)]
pub struct ModuleRepository {
    pool: PgPool,
}

impl ModuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn device_thresholds(&self, device_id: &str) -> Result<DeviceThresholds> {
        sqlx::query_as::<_, DeviceThresholds>(
            r#"
            SELECT device_id,
                   setting_temperature::float8 AS setpoint,
                   max_temperature::float8 AS max_temperature,
                   min_temperature::float8 AS min_temperature
            FROM modules
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(device_id.to_string()))
    }

    pub async fn list_enabled(&self) -> Result<Vec<EnabledModule>> {
        let modules = sqlx::query_as::<_, EnabledModule>(
            r#"
            SELECT device_id, setting_temperature::float8 AS setpoint
            FROM modules
            WHERE is_enabled
            ORDER BY device_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(modules)
    }
}
