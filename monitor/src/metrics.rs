use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ACTIVE_VIEWERS: Gauge = Gauge::with_opts(Opts::new(
        "monitor_active_viewers",
        "Websocket viewers with a live subscription"
    ))
    .unwrap();
    pub static ref FRAMES_FORWARDED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_frames_forwarded_total",
        "Temperature frames written to viewers"
    ))
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(ACTIVE_VIEWERS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(FRAMES_FORWARDED_TOTAL.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
