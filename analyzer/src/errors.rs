use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] coldchain_common::Error),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message has no {0}")]
    MissingField(&'static str),

    #[error("Message {0} is not valid UTF-8")]
    Encoding(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The device is unknown to the relational store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Common(coldchain_common::Error::NotFound(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
