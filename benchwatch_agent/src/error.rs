use thiserror::Error;

/// Failure to hand one event to a subscriber.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,

    #[error("sink full, event dropped")]
    Full,

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("missing value for {0}")]
    MissingValue(&'static str),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}
