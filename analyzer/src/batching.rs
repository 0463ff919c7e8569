use crate::db::{insert_alarms, insert_measurements};
use crate::metrics::{BATCH_SIZE, DB_FAILURES_TOTAL, INGEST_LATENCY_SECONDS, RECORDS_DROPPED_TOTAL};
use crate::model::{AlarmRecord, AnalyticsRecord, MeasurementRecord};
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

/// Fire-and-forget handle to the analytics store.
///
/// `submit` never waits: when the queue is full the record is dropped and
/// counted, so message processing does not depend on the store keeping up.
#[derive(Debug, Clone)]
pub struct AnalyticsWriter {
    tx: mpsc::Sender<AnalyticsRecord>,
}

impl AnalyticsWriter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AnalyticsRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn submit(&self, record: AnalyticsRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                RECORDS_DROPPED_TOTAL.inc();
                warn!("Analytics queue full, dropping {:?}", record);
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("Analytics writer stopped, record not stored");
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct Batch {
    alarms: Vec<AlarmRecord>,
    measurements: Vec<MeasurementRecord>,
}

impl Batch {
    fn push(&mut self, record: AnalyticsRecord) {
        match record {
            AnalyticsRecord::Alarm(alarm) => self.alarms.push(alarm),
            AnalyticsRecord::Measurement(measurement) => self.measurements.push(measurement),
        }
    }

    fn len(&self) -> usize {
        self.alarms.len() + self.measurements.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        self.alarms.clear();
        self.measurements.clear();
    }
}

pub async fn run_batcher(
    mut rx: mpsc::Receiver<AnalyticsRecord>,
    pool: PgPool,
    max_batch: usize,
    max_wait_ms: u64,
) {
    info!(
        "Starting analytics batcher with max_batch={}, max_wait_ms={}",
        max_batch, max_wait_ms
    );

    let mut batch = Batch::default();
    let mut ticker = interval(Duration::from_millis(max_wait_ms));

    loop {
        tokio::select! {
            record = rx.recv() => {
                match record {
                    Some(record) => {
                        batch.push(record);

                        if batch.len() >= max_batch {
                            flush_batch(&pool, &mut batch).await;
                        }
                    }
                    None => {
                        info!("Analytics channel closed, flushing remaining batch");
                        flush_batch(&pool, &mut batch).await;
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush_batch(&pool, &mut batch).await;
                }
            }
        }
    }

    info!("Analytics batcher stopped");
}

/// Writes the batch once. Failures are logged and the records dropped.
async fn flush_batch(pool: &PgPool, batch: &mut Batch) {
    let batch_len = batch.len();
    if batch_len == 0 {
        return;
    }

    debug!("Flushing batch of {} analytics records", batch_len);
    BATCH_SIZE.set(batch_len as f64);
    let start = Instant::now();

    if let Err(e) = insert_alarms(pool, &batch.alarms).await {
        DB_FAILURES_TOTAL.inc();
        error!("Failed to insert {} alarm records: {}", batch.alarms.len(), e);
    }
    if let Err(e) = insert_measurements(pool, &batch.measurements).await {
        DB_FAILURES_TOTAL.inc();
        error!(
            "Failed to insert {} measurement records: {}",
            batch.measurements.len(),
            e
        );
    }

    INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    batch.clear();
    BATCH_SIZE.set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn measurement(device_id: &str) -> AnalyticsRecord {
        AnalyticsRecord::Measurement(MeasurementRecord {
            timestamp: Utc::now(),
            device_id: device_id.to_string(),
            temperature: 4.0,
            battery: 80.0,
        })
    }

    fn device_of(record: AnalyticsRecord) -> String {
        match record {
            AnalyticsRecord::Measurement(m) => m.device_id,
            AnalyticsRecord::Alarm(a) => a.device_id,
        }
    }

    #[test]
    fn test_submit_drops_when_queue_full() {
        tokio_test::block_on(async {
            let (writer, mut rx) = AnalyticsWriter::channel(2);

            assert!(writer.submit(measurement("a")));
            assert!(writer.submit(measurement("b")));
            assert!(!writer.submit(measurement("c")));
            drop(writer);

            let mut stored = Vec::new();
            while let Some(record) = rx.recv().await {
                stored.push(device_of(record));
            }
            assert_eq!(stored, vec!["a", "b"]);
        });
    }

    #[test]
    fn test_submit_after_writer_stopped_reports_failure() {
        let (writer, rx) = AnalyticsWriter::channel(4);
        drop(rx);

        assert!(!writer.submit(measurement("a")));
    }

    #[test]
    fn test_batch_splits_records_by_kind() {
        let mut batch = Batch::default();
        batch.push(measurement("a"));
        batch.push(AnalyticsRecord::Alarm(AlarmRecord::high("a", "hot".to_string())));
        batch.push(measurement("b"));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.alarms.len(), 1);
        assert_eq!(batch.measurements.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
    }
}
