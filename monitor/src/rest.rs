use crate::errors::Result;
use crate::model::{Alarm, AlarmResponse, DeviceStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::error;

#[derive(Debug, Clone)]
struct AppState {
    pool: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct AlarmQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

pub fn create_router(pool: PgPool) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/api/monitor/temperature/list", get(list_temperature))
        .route("/api/monitor/alarm", get(list_alarms))
        .route("/api/monitor/alarm/:device_id", get(device_alarms))
        .with_state(state)
}

async fn list_temperature(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<DeviceStatus>>, AppError> {
    Ok(Json(latest_per_device(&state.pool).await?))
}

async fn device_alarms(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> std::result::Result<Response, AppError> {
    if device_id.trim().is_empty() {
        return Ok(bad_request("device_id is required"));
    }

    let alarms = alarms_for_device(&state.pool, &device_id).await?;
    Ok(Json(alarms).into_response())
}

async fn list_alarms(
    State(state): State<AppState>,
    Query(params): Query<AlarmQuery>,
) -> std::result::Result<Json<AlarmResponse>, AppError> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let offset = params.offset.unwrap_or(0);

    let alarms = alarm_page(&state.pool, limit, offset).await?;

    Ok(Json(AlarmResponse::page(alarms, limit, offset)))
}

async fn latest_per_device(pool: &PgPool) -> Result<Vec<DeviceStatus>> {
    let rows = sqlx::query_as::<_, DeviceStatus>(
        r#"
        SELECT DISTINCT ON (device_id) device_id, temperature, battery_level
        FROM module_monitor
        ORDER BY device_id, time_stamp DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn alarms_for_device(pool: &PgPool, device_id: &str) -> Result<Vec<Alarm>> {
    let rows = sqlx::query_as::<_, Alarm>(
        r#"
        SELECT device_id, alarm_level, alarm_status, remark,
               time_stamp AS event_time, alarm_description
        FROM alarm_record
        WHERE device_id = $1
        ORDER BY time_stamp DESC
        "#,
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn alarm_page(pool: &PgPool, limit: usize, offset: usize) -> Result<Vec<Alarm>> {
    let rows = sqlx::query_as::<_, Alarm>(
        r#"
        SELECT device_id, alarm_level, alarm_status, remark,
               time_stamp AS event_time, alarm_description
        FROM alarm_record
        ORDER BY time_stamp DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
