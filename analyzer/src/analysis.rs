use crate::batching::AnalyticsWriter;
use crate::directory::DeviceDirectory;
use crate::errors::Result;
use crate::metrics::ALARMS_TOTAL;
use crate::model::{
    AlarmRecord, AnalyticsRecord, DeviceThresholds, MeasurementRecord, LOW_BATTERY_DESCRIPTION,
};
use async_trait::async_trait;
use chrono::Utc;
use coldchain_common::reading::Reading;
use tracing::{debug, warn};

/// Per-message analysis step plugged into the stream processor.
#[async_trait]
pub trait Analysis: Send + Sync {
    async fn analyze(&self, device_id: &str, payload: &str) -> Result<()>;
}

/// Alarms a reading raises against its device's thresholds.
///
/// The temperature and battery checks are independent, so one reading can
/// produce zero, one or two alarms.
pub fn evaluate(
    device_id: &str,
    reading: &Reading,
    thresholds: &DeviceThresholds,
    low_battery_threshold: f64,
) -> Vec<AlarmRecord> {
    let mut alarms = Vec::new();

    if !thresholds.contains(reading.temperature) {
        alarms.push(AlarmRecord::high(
            device_id,
            format!(
                "Current temperature is {:.2}, out of range [{:.2}, {:.2}]",
                reading.temperature, thresholds.min_temperature, thresholds.max_temperature
            ),
        ));
    }

    if reading.battery < low_battery_threshold {
        alarms.push(AlarmRecord::high(
            device_id,
            LOW_BATTERY_DESCRIPTION.to_string(),
        ));
    }

    alarms
}

pub struct ThresholdAnalysis {
    directory: DeviceDirectory,
    writer: AnalyticsWriter,
    low_battery_threshold: f64,
}

impl ThresholdAnalysis {
    pub fn new(directory: DeviceDirectory, writer: AnalyticsWriter, low_battery_threshold: f64) -> Self {
        Self {
            directory,
            writer,
            low_battery_threshold,
        }
    }
}

#[async_trait]
impl Analysis for ThresholdAnalysis {
    async fn analyze(&self, device_id: &str, payload: &str) -> Result<()> {
        let reading: Reading = payload.parse()?;
        let thresholds = self.directory.get(device_id).await?;
        debug!(
            "Device {} temperature: {}, battery: {}",
            device_id, reading.temperature, reading.battery
        );

        for alarm in evaluate(device_id, &reading, &thresholds, self.low_battery_threshold) {
            warn!("Device {}: {}", device_id, alarm.description);
            ALARMS_TOTAL.inc();
            self.writer.submit(AnalyticsRecord::Alarm(alarm));
        }

        self.writer
            .submit(AnalyticsRecord::Measurement(MeasurementRecord {
                timestamp: Utc::now(),
                device_id: device_id.to_string(),
                temperature: reading.temperature,
                battery: reading.battery,
            }));

        Ok(())
    }
}
