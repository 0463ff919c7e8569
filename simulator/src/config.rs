use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "simulator", about = "Simulated cold-chain module fleet")]
pub struct Config {
    /// Bootstrap servers of the raw telemetry cluster
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    pub brokers: String,

    #[arg(long, env = "TOPIC", default_value = "device")]
    pub topic: String,

    #[arg(long, env = "TOPIC_PARTITIONS", default_value_t = 3)]
    pub partitions: i32,

    #[arg(long, env = "TOPIC_REPLICATION", default_value_t = 1)]
    pub replication: i32,

    #[arg(long, env = "TOPIC_RETENTION_MS", default_value_t = 60_000)]
    pub retention_ms: i64,

    /// Emission ticks per second; every tick sends one reading per device
    #[arg(long, env = "RATE", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate: u64,

    /// Synthetic devices simulated in addition to the enabled modules
    #[arg(long, env = "DEVICES", default_value_t = 0)]
    pub devices: usize,

    #[arg(long, env = "DEVICE_PREFIX", default_value = "device_")]
    pub device_prefix: String,

    /// Setpoint given to synthetic devices
    #[arg(long, env = "DEFAULT_SETPOINT", default_value_t = 4.0)]
    pub default_setpoint: f64,

    /// Battery percentage drained per tick
    #[arg(long, env = "BATTERY_DRAIN", default_value_t = 0.001)]
    pub battery_drain: f64,

    /// Per-tick probability that a device fails
    #[arg(long, env = "FAULT_PROBABILITY", default_value_t = 0.0001)]
    pub fault_probability: f64,

    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_interval_secs: u64,

    /// Relational store holding the module table; synthetic devices only when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}
