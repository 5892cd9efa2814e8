use std::io;
use std::path::PathBuf;

/// Error type returned when configuring or starting any part of the
/// pipeline.
///
/// Only setup paths return this type. Once a record has been handed to
/// a [`WriteEngine`](crate::engine::WriteEngine) failures are accounted
/// in its counters and never travel back to the producer.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("invalid max bytes: must be greater than zero")]
    InvalidMaxBytes,

    #[error("invalid rotation interval multiplier: {0}")]
    InvalidInterval(u32),

    #[error("invalid rate limit: rate={rate}, burst={burst}")]
    InvalidRateLimit { rate: f64, burst: u32 },

    #[error("invalid queue capacity: must be greater than zero")]
    InvalidQueueCapacity,

    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start write engine {name}: {source}")]
    EngineStart {
        name: String,
        #[source]
        source: io::Error,
    },

    #[cfg(feature = "tracing-layer")]
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error type returned when parsing a network handler DSN.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme in {0:?}")]
    UnknownScheme(String),

    #[error("missing address in DSN {0:?}")]
    MissingAddress(String),

    #[error("invalid query parameter {key}={value:?}")]
    InvalidQuery { key: String, value: String },
}

/// Error produced by a [`Formatter`](crate::formatter::Formatter).
///
/// The write engine never surfaces it; it falls back to the text-line
/// formatter and counts the failure.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to encode record as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}
