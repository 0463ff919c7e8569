//! Live temperature feed for a single device.
//!
//! Every websocket viewer gets a consumer group of its own over the raw
//! topic, so viewers never share a stream and a slow viewer only holds back
//! its own offsets. The group is deleted from the broker when the viewer
//! leaves or the broker fails.

use crate::errors::Result;
use crate::metrics::{ACTIVE_VIEWERS, FRAMES_FORWARDED_TOTAL};
use crate::rest::bad_request;
use axum::extract::ws::{Message as Frame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use coldchain_common::admin::delete_consumer_group;
use coldchain_common::reading::temperature_field;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::Message;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub brokers: String,
    pub topic: String,
}

/// Selects the frames one viewer asked for.
#[derive(Debug, Clone)]
pub struct ViewerFilter {
    device_id: String,
}

impl ViewerFilter {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// The temperature field of a message keyed with this viewer's device.
    pub fn frame(&self, key: Option<&[u8]>, payload: Option<&[u8]>) -> Option<String> {
        if key != Some(self.device_id.as_bytes()) {
            return None;
        }
        let payload = std::str::from_utf8(payload?).ok()?;
        temperature_field(payload).map(str::to_string)
    }
}

#[derive(Debug)]
pub enum PumpEnd {
    /// Writing to the viewer failed.
    ViewerGone,
    /// The broker session failed.
    Broker(KafkaError),
    /// The message stream ran dry.
    Exhausted,
}

/// Forwards matching frames from `messages` to `sink` in arrival order.
pub async fn pump<M, S, K>(filter: &ViewerFilter, messages: S, sink: &mut K) -> PumpEnd
where
    M: Message,
    S: Stream<Item = KafkaResult<M>>,
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    futures::pin_mut!(messages);

    while let Some(item) = messages.next().await {
        match item {
            Ok(message) => {
                let Some(frame) = filter.frame(message.key(), message.payload()) else {
                    continue;
                };
                if let Err(e) = sink.send(frame).await {
                    debug!("Viewer of {} went away: {}", filter.device_id, e);
                    return PumpEnd::ViewerGone;
                }
                FRAMES_FORWARDED_TOTAL.inc();
            }
            Err(e) if ends_viewer(&e) => return PumpEnd::Broker(e),
            Err(e) => warn!("Consume error for viewer of {}: {}", filter.device_id, e),
        }
    }

    PumpEnd::Exhausted
}

/// Consume errors that end a viewer's feed. Lost brokers and group
/// rebalances are left to the client, which reconnects and rejoins on its own.
fn ends_viewer(error: &KafkaError) -> bool {
    matches!(
        error,
        KafkaError::MessageConsumptionFatal(_)
            | KafkaError::Subscription(_)
            | KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)
    )
}

pub fn create_router(settings: FanoutSettings) -> Router {
    Router::new()
        .route("/ws/monitor/temperature/", get(missing_device))
        .route("/ws/monitor/temperature/:device_id", get(monitor_temperature))
        .with_state(Arc::new(settings))
}

async fn missing_device() -> Response {
    bad_request("device_id is required")
}

async fn monitor_temperature(
    Path(device_id): Path<String>,
    State(settings): State<Arc<FanoutSettings>>,
    ws: WebSocketUpgrade,
) -> Response {
    if device_id.trim().is_empty() {
        return bad_request("device_id is required");
    }

    ws.on_upgrade(move |socket| watch(socket, settings, device_id))
        .into_response()
}

async fn watch(socket: WebSocket, settings: Arc<FanoutSettings>, device_id: String) {
    let group_id = format!("monitor-{}", uuid::Uuid::new_v4());

    let consumer = match viewer_consumer(&settings, &group_id) {
        Ok(consumer) => consumer,
        Err(e) => {
            error!("Cannot subscribe viewer of {}: {}", device_id, e);
            return;
        }
    };

    info!("Viewer {} connected for device {}", group_id, device_id);
    ACTIVE_VIEWERS.inc();

    let (sink, mut incoming) = socket.split();
    let mut sink = sink.with(|text: String| future::ok::<_, axum::Error>(Frame::Text(text)));
    let filter = ViewerFilter::new(device_id.as_str());

    let end = tokio::select! {
        end = pump(&filter, consumer.stream(), &mut sink) => end,
        _ = closed(&mut incoming) => PumpEnd::ViewerGone,
    };

    if let PumpEnd::Broker(e) = &end {
        error!("Broker error for viewer {}: {}", group_id, e);
        let notice = serde_json::json!({ "error": e.to_string() }).to_string();
        let _ = sink.send(notice).await;
    }
    let _ = sink.close().await;

    release(consumer, &settings.brokers, &group_id).await;

    ACTIVE_VIEWERS.dec();
    info!("Viewer {} disconnected from device {} ({:?})", group_id, device_id, end);
}

/// Resolves when the viewer closes the socket, it errors or it ends.
async fn closed<S, E>(incoming: &mut S)
where
    S: Stream<Item = std::result::Result<Frame, E>> + Unpin,
    E: Display,
{
    while let Some(result) = incoming.next().await {
        match result {
            Ok(Frame::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Websocket receive error: {}", e);
                break;
            }
        }
    }
}

/// Leaves the viewer's group, then deletes it on the broker.
async fn release(consumer: StreamConsumer, brokers: &str, group_id: &str) {
    if let Err(e) = tokio::task::spawn_blocking(move || drop(consumer)).await {
        warn!("Closing consumer for viewer {} failed: {}", group_id, e);
    }
    delete_consumer_group(brokers, group_id).await;
}

fn viewer_consumer(settings: &FanoutSettings, group_id: &str) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &settings.brokers)
        .set("group.id", group_id)
        .set("auto.offset.reset", "latest")
        .set("session.timeout.ms", "10000")
        .create()?;

    consumer.subscribe(&[settings.topic.as_str()])?;
    Ok(consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::stream;
    use rdkafka::message::{OwnedMessage, Timestamp};

    fn reading(offset: i64, key: &str, payload: &str) -> KafkaResult<OwnedMessage> {
        Ok(OwnedMessage::new(
            Some(payload.as_bytes().to_vec()),
            Some(key.as_bytes().to_vec()),
            "device".to_string(),
            Timestamp::NotAvailable,
            0,
            offset,
            None,
        ))
    }

    #[test]
    fn test_filter_matches_exact_key() {
        let filter = ViewerFilter::new("A");

        assert_eq!(
            filter.frame(Some(b"A".as_slice()), Some(b"4.10 99.00".as_slice())),
            Some("4.10".to_string())
        );
        assert_eq!(filter.frame(Some(b"AB".as_slice()), Some(b"4.10 99.00".as_slice())), None);
        assert_eq!(filter.frame(None, Some(b"4.10 99.00".as_slice())), None);
        assert_eq!(filter.frame(Some(b"A".as_slice()), None), None);
    }

    #[test]
    fn test_viewer_receives_only_its_device_in_order() {
        tokio_test::block_on(async {
            let messages = stream::iter(vec![
                reading(0, "A", "1.00 90.00"),
                reading(1, "B", "7.00 80.00"),
                reading(2, "A", "1.10 89.90"),
                reading(3, "B", "7.10 79.90"),
                reading(4, "B", "7.20 79.80"),
                reading(5, "A", "1.20 89.80"),
            ]);
            let (mut tx, rx) = mpsc::unbounded::<String>();

            let end = pump(&ViewerFilter::new("A"), messages, &mut tx).await;
            drop(tx);

            assert!(matches!(end, PumpEnd::Exhausted));
            let frames: Vec<String> = rx.collect().await;
            assert_eq!(frames, vec!["1.00", "1.10", "1.20"]);
        });
    }

    #[test]
    fn test_transient_errors_are_skipped() {
        tokio_test::block_on(async {
            let messages = stream::iter(vec![
                reading(0, "A", "1.00 90.00"),
                Err(KafkaError::MessageConsumption(RDKafkaErrorCode::PartitionEOF)),
                reading(1, "A", "1.10 89.90"),
            ]);
            let (mut tx, rx) = mpsc::unbounded::<String>();

            pump(&ViewerFilter::new("A"), messages, &mut tx).await;
            drop(tx);

            let frames: Vec<String> = rx.collect().await;
            assert_eq!(frames, vec!["1.00", "1.10"]);
        });
    }

    #[test]
    fn test_viewer_gone_stops_pump() {
        tokio_test::block_on(async {
            let messages = stream::iter(vec![
                reading(0, "A", "1.00 90.00"),
                reading(1, "A", "1.10 89.90"),
            ]);
            let (mut tx, rx) = mpsc::unbounded::<String>();
            drop(rx);

            let end = pump(&ViewerFilter::new("A"), messages, &mut tx).await;

            assert!(matches!(end, PumpEnd::ViewerGone));
        });
    }

    #[test]
    fn test_fatal_broker_error_stops_pump() {
        tokio_test::block_on(async {
            let messages = stream::iter(vec![
                reading(0, "A", "1.00 90.00"),
                Err(KafkaError::MessageConsumptionFatal(RDKafkaErrorCode::Fatal)),
                reading(1, "A", "1.10 89.90"),
            ]);
            let (mut tx, rx) = mpsc::unbounded::<String>();

            let end = pump(&ViewerFilter::new("A"), messages, &mut tx).await;
            drop(tx);

            assert!(matches!(end, PumpEnd::Broker(_)));
            let frames: Vec<String> = rx.collect().await;
            assert_eq!(frames, vec!["1.00"]);
        });
    }

    #[test]
    fn test_lost_brokers_do_not_end_the_feed() {
        tokio_test::block_on(async {
            let messages = stream::iter(vec![
                reading(0, "A", "1.00 90.00"),
                Err(KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown)),
                Err(KafkaError::MessageConsumption(
                    RDKafkaErrorCode::BrokerTransportFailure,
                )),
                reading(1, "A", "1.10 89.90"),
            ]);
            let (mut tx, rx) = mpsc::unbounded::<String>();

            let end = pump(&ViewerFilter::new("A"), messages, &mut tx).await;
            drop(tx);

            assert!(matches!(end, PumpEnd::Exhausted));
            let frames: Vec<String> = rx.collect().await;
            assert_eq!(frames, vec!["1.00", "1.10"]);
        });
    }

    #[test]
    fn test_close_frame_ends_viewer_session() {
        tokio_test::block_on(async {
            let mut incoming = stream::iter(vec![
                Ok::<_, String>(Frame::Text("hello".to_string())),
                Ok(Frame::Close(None)),
                Ok(Frame::Text("after close".to_string())),
            ]);

            closed(&mut incoming).await;

            assert!(matches!(
                incoming.next().await,
                Some(Ok(Frame::Text(text))) if text == "after close"
            ));
        });
    }

    #[test]
    fn test_receive_error_or_end_of_stream_ends_viewer_session() {
        tokio_test::block_on(async {
            let mut failing = stream::iter(vec![
                Ok(Frame::Ping(Vec::new())),
                Err("connection reset".to_string()),
                Ok(Frame::Text("unread".to_string())),
            ]);
            closed(&mut failing).await;
            assert!(failing.next().await.is_some());

            let mut ended = stream::iter(Vec::<std::result::Result<Frame, String>>::new());
            closed(&mut ended).await;
            assert!(ended.next().await.is_none());
        });
    }

    #[test]
    #[ignore]
    fn test_release_deletes_viewer_group() {
        use rdkafka::consumer::BaseConsumer;
        use std::time::Duration;

        tokio_test::block_on(async {
            let settings = FanoutSettings {
                brokers: "localhost:9092".to_string(),
                topic: "device".to_string(),
            };
            let group_id = format!("monitor-{}", uuid::Uuid::new_v4());
            let consumer = viewer_consumer(&settings, &group_id).unwrap();

            // Polling makes the consumer join its group.
            let _ = tokio::time::timeout(Duration::from_secs(10), consumer.recv()).await;

            let admin: BaseConsumer = ClientConfig::new()
                .set("bootstrap.servers", &settings.brokers)
                .create()
                .unwrap();
            let state = |admin: &BaseConsumer| -> Vec<String> {
                admin
                    .fetch_group_list(Some(group_id.as_str()), Duration::from_secs(10))
                    .unwrap()
                    .groups()
                    .iter()
                    .map(|g| g.state().to_string())
                    .collect()
            };
            assert!(state(&admin).iter().any(|s| s != "Dead"));

            release(consumer, &settings.brokers, &group_id).await;

            assert!(state(&admin).iter().all(|s| s == "Dead"));
        });
    }
}
