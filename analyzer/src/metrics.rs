use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_messages_total",
        "Total messages claimed from the source topic"
    ))
    .unwrap();
    pub static ref COMMITTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_committed_total",
        "Total messages analyzed, relayed and marked consumed"
    ))
    .unwrap();
    pub static ref ANALYSIS_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_analysis_failures_total",
        "Total messages skipped because analysis failed"
    ))
    .unwrap();
    pub static ref RELAY_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_relay_failures_total",
        "Total messages skipped because the sink relay failed"
    ))
    .unwrap();
    pub static ref ALARMS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_alarms_total",
        "Total alarm records raised"
    ))
    .unwrap();
    pub static ref CACHE_HITS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_cache_hits_total",
        "Threshold lookups answered by the cache"
    ))
    .unwrap();
    pub static ref CACHE_MISSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_cache_misses_total",
        "Threshold lookups that fell through to the relational store"
    ))
    .unwrap();
    pub static ref RECORDS_DROPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_records_dropped_total",
        "Analytics records dropped because the writer queue was full"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "analyzer_db_failures_total",
        "Total analytics insert failures"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "analyzer_insert_latency_seconds",
            "Time taken to insert a batch into the analytics store"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref BATCH_SIZE: Gauge = Gauge::with_opts(Opts::new(
        "analyzer_batch_size",
        "Current batch size being flushed"
    ))
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(COMMITTED_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(ANALYSIS_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RELAY_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ALARMS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(CACHE_HITS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RECORDS_DROPPED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(BATCH_SIZE.clone())).unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
