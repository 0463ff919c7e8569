use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Topic admin error on '{topic}': {reason}")]
    Admin { topic: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed reading payload: {0}")]
    Payload(String),

    #[error("Device {0} not found")]
    NotFound(String),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
