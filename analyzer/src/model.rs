use chrono::{DateTime, Utc};

pub use coldchain_common::modules::DeviceThresholds;

pub const ALARM_LEVEL_HIGH: &str = "HIGH";
pub const ALARM_STATUS_UNREAD: &str = "unread";
pub const LOW_BATTERY_DESCRIPTION: &str = "Battery is too low";

/// A threshold violation. The store stamps the time when the row is inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRecord {
    pub device_id: String,
    pub level: String,
    pub description: String,
    pub status: String,
}

impl AlarmRecord {
    pub fn high(device_id: &str, description: String) -> Self {
        Self {
            device_id: device_id.to_string(),
            level: ALARM_LEVEL_HIGH.to_string(),
            description,
            status: ALARM_STATUS_UNREAD.to_string(),
        }
    }
}

/// One analyzed reading, stored whether or not it raised an alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub temperature: f64,
    pub battery: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsRecord {
    Alarm(AlarmRecord),
    Measurement(MeasurementRecord),
}
