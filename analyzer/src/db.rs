use crate::errors::Result;
use crate::model::{AlarmRecord, MeasurementRecord};
use chrono::{DateTime, Utc};
use coldchain_common::db::make_pool as connect;
use sqlx::PgPool;
use tracing::info;

/// Connects to the analytics store and brings its schema up to date.
pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    let pool = connect(database_url, 20).await?;

    info!("Running analytics migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

pub async fn insert_alarms(pool: &PgPool, batch: &[AlarmRecord]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let device_ids: Vec<&str> = batch.iter().map(|a| a.device_id.as_str()).collect();
    let levels: Vec<&str> = batch.iter().map(|a| a.level.as_str()).collect();
    let descriptions: Vec<&str> = batch.iter().map(|a| a.description.as_str()).collect();
    let statuses: Vec<&str> = batch.iter().map(|a| a.status.as_str()).collect();

    sqlx::query(
        r#"
        INSERT INTO alarm_record (time_stamp, device_id, alarm_level, alarm_description, alarm_status)
        SELECT now(), * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[])
        "#,
    )
    .bind(&device_ids)
    .bind(&levels)
    .bind(&descriptions)
    .bind(&statuses)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_measurements(pool: &PgPool, batch: &[MeasurementRecord]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let timestamps: Vec<DateTime<Utc>> = batch.iter().map(|m| m.timestamp).collect();
    let device_ids: Vec<&str> = batch.iter().map(|m| m.device_id.as_str()).collect();
    let temperatures: Vec<f64> = batch.iter().map(|m| m.temperature).collect();
    let batteries: Vec<f64> = batch.iter().map(|m| m.battery).collect();

    sqlx::query(
        r#"
        INSERT INTO module_monitor (time_stamp, device_id, temperature, battery_level)
        SELECT * FROM UNNEST($1::timestamptz[], $2::text[], $3::float8[], $4::float8[])
        "#,
    )
    .bind(&timestamps)
    .bind(&device_ids)
    .bind(&temperatures)
    .bind(&batteries)
    .execute(pool)
    .await?;

    Ok(())
}
