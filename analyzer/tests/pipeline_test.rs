//! Live pipeline checks. They need both clusters, the stores and a running
//! analyzer, with `dev-1` registered in the `modules` table:
//!
//!     cargo test -p analyzer --test pipeline_test -- --ignored --nocapture

use futures::future::join_all;
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

const SOURCE_BROKERS: &str = "localhost:9092";
const SINK_BROKERS: &str = "localhost:9093";
const TOPIC: &str = "device";
const GROUP_ID: &str = "analyzer";

fn producer(brokers: &str) -> FutureProducer {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .unwrap()
}

fn sink_consumer() -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", SINK_BROKERS)
        .set("group.id", format!("pipeline-test-{}", uuid::Uuid::new_v4()))
        .set("auto.offset.reset", "latest")
        .create()
        .unwrap();
    consumer.subscribe(&[TOPIC]).unwrap();
    consumer
}

#[tokio::test]
#[ignore]
async fn test_reading_is_relayed_verbatim() {
    let consumer = sink_consumer();
    // Give the group time to be assigned partitions before producing.
    sleep(Duration::from_secs(3)).await;

    producer(SOURCE_BROKERS)
        .send(
            FutureRecord::to(TOPIC).key("dev-1").payload("9.00 50.00"),
            Timeout::After(Duration::from_secs(5)),
        )
        .await
        .map_err(|(e, _)| e)
        .unwrap();

    let relayed = timeout(Duration::from_secs(30), async {
        loop {
            let message = consumer.recv().await.unwrap();
            if message.key() == Some(b"dev-1".as_slice()) {
                return message.payload().map(|p| p.to_vec());
            }
        }
    })
    .await
    .expect("no relayed message within 30s");

    assert_eq!(relayed.as_deref(), Some(b"9.00 50.00".as_slice()));
}

#[tokio::test]
#[ignore]
async fn test_1000_readings_per_second() {
    let producer = producer(SOURCE_BROKERS);
    let total = 10_000;
    let burst = 100;
    let pause = Duration::from_millis(100);

    let start = Instant::now();
    let mut sent = 0;
    let mut failed = 0;

    for burst_start in (0..total).step_by(burst) {
        let payloads: Vec<(String, String)> = {
            let mut rng = rand::thread_rng();
            (burst_start..burst_start + burst)
                .map(|i| {
                    (
                        format!("load-test-dev-{}", i % 10),
                        format!("{:.2} {:.2}", rng.gen_range(-2.0..10.0), rng.gen_range(0.0..100.0)),
                    )
                })
                .collect()
        };

        let sends = payloads.iter().map(|(key, payload)| {
            let record = FutureRecord::to(TOPIC).key(key).payload(payload);
            producer.send(record, Timeout::After(Duration::from_secs(5)))
        });
        for result in join_all(sends).await {
            match result {
                Ok(_) => sent += 1,
                Err((e, _)) => {
                    failed += 1;
                    if failed < 10 {
                        eprintln!("Send error: {}", e);
                    }
                }
            }
        }

        sleep(pause).await;
    }

    let rate = sent as f64 / start.elapsed().as_secs_f64();
    println!("Sent {} readings at {:.0}/s, {} failed", sent, rate, failed);

    assert_eq!(failed, 0);
    assert!(rate >= 900.0, "Throughput too low: {:.2}/s", rate);
}

/// Next offset the analyzer's group would resume partition 0 from.
fn committed_offset(consumer: &BaseConsumer) -> Option<i64> {
    let mut partitions = TopicPartitionList::new();
    partitions.add_partition(TOPIC, 0);
    let committed = consumer
        .committed_offsets(partitions, Duration::from_secs(10))
        .ok()?;
    match committed.find_partition(TOPIC, 0)?.offset() {
        Offset::Offset(offset) => Some(offset),
        _ => None,
    }
}

#[tokio::test]
#[ignore]
async fn test_skipped_reading_is_not_redelivered_after_later_commit() {
    let producer = producer(SOURCE_BROKERS);
    let unknown = format!("unregistered-{}", uuid::Uuid::new_v4());
    let send_timeout = Timeout::After(Duration::from_secs(5));

    let (_, skipped) = producer
        .send(
            FutureRecord::to(TOPIC).partition(0).key(unknown.as_str()).payload("4.00 80.00"),
            send_timeout,
        )
        .await
        .map_err(|(e, _)| e)
        .unwrap();
    let (_, marked) = producer
        .send(
            FutureRecord::to(TOPIC).partition(0).key("dev-1").payload("5.00 80.00"),
            send_timeout,
        )
        .await
        .map_err(|(e, _)| e)
        .unwrap();
    assert!(marked > skipped);

    // Same group as the analyzer, manually assigned so it never joins the
    // group and never commits on its behalf.
    let restarted: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", SOURCE_BROKERS)
        .set("group.id", GROUP_ID)
        .set("enable.auto.commit", "false")
        .create()
        .unwrap();

    let committed = timeout(Duration::from_secs(60), async {
        loop {
            match committed_offset(&restarted) {
                Some(offset) if offset > marked => return offset,
                _ => sleep(Duration::from_secs(1)).await,
            }
        }
    })
    .await
    .expect("analyzer did not commit past the registered device's reading");
    assert!(committed > skipped);

    let mut partitions = TopicPartitionList::new();
    partitions.add_partition(TOPIC, 0);
    restarted.assign(&partitions).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(Ok(message)) = restarted.poll(Duration::from_millis(200)) {
            assert!(message.offset() >= committed);
            assert_ne!(message.key(), Some(unknown.as_bytes()));
        }
    }
}
