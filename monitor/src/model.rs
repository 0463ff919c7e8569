use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest reading stored for one device.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeviceStatus {
    pub device_id: String,
    pub temperature: f64,
    pub battery_level: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Alarm {
    pub device_id: String,
    pub alarm_level: String,
    pub alarm_status: String,
    pub remark: String,
    pub event_time: DateTime<Utc>,
    pub alarm_description: String,
}

/// One page of alarms. `count` is the number of rows in this page.
#[derive(Debug, Serialize)]
pub struct AlarmResponse {
    pub data: Vec<Alarm>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

impl AlarmResponse {
    pub fn page(data: Vec<Alarm>, limit: usize, offset: usize) -> Self {
        Self {
            count: data.len(),
            data,
            limit,
            offset,
        }
    }
}
